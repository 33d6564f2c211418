//! Drive Identification Tests
//!
//! Identify block decoding, the LBA geometry rebuild and discovery of the
//! drives on a channel.

#[cfg(test)]
mod tests {
    use crate::mock::{self, DiskSpec, MockClock, MockIde};
    use podule_ide::identify::{self, copy_string};
    use podule_ide::{Drive, Geometry, HostType, IdeDrive, IdeError, PioChannel};

    fn block(spec: &DiskSpec) -> [u8; 512] {
        let mut raw = [0u8; 512];
        for (i, w) in spec.identify_block().iter().enumerate() {
            raw[i * 2..i * 2 + 2].copy_from_slice(&w.to_le_bytes());
        }
        raw
    }

    fn parsed(spec: &DiskSpec) -> Drive {
        let mut drive = Drive::absent();
        identify::parse(&block(spec), &mut drive);
        drive
    }

    // =========================================================================
    // Identify block decoding
    // =========================================================================

    #[test]
    fn test_parse_chs_drive() {
        let drive = parsed(&DiskSpec::chs(980, 5, 17));

        assert!(!drive.lba);
        assert_eq!(drive.geometry, Geometry::new(980, 5, 17));
        assert_eq!(drive.total_sectors, 980 * 5 * 17);
        assert_eq!(drive.capabilities, 0);
        assert_eq!(drive.model_str(), "EMU CHS DISK");
        assert_eq!(drive.firmware_str(), "1.0");
    }

    #[test]
    fn test_parse_lba_drive_keeps_consistent_geometry() {
        let drive = parsed(&DiskSpec::lba(100));

        assert!(drive.lba);
        assert_eq!(drive.total_sectors, 100_800);
        assert_eq!(drive.geometry, Geometry::new(100, 16, 63));
        assert_eq!(drive.capacity_mb(), 49);
    }

    #[test]
    fn test_parse_lba_drive_rebuilds_mismatched_geometry() {
        let spec = DiskSpec {
            cylinders: 1000,
            heads: 15,
            sectors_per_track: 17,
            lba_sectors: Some(1_000_000),
            ..DiskSpec::lba(1)
        };
        let drive = parsed(&spec);

        assert!(drive.lba);
        assert_eq!(drive.total_sectors, 1_000_000);
        assert_eq!(drive.geometry, Geometry::new(1_000_000 / 1008, 16, 63));
    }

    #[test]
    fn test_parse_lba_drive_with_16_63_but_wrong_cylinders() {
        let spec = DiskSpec {
            cylinders: 50,
            lba_sectors: Some(200 * 1008),
            ..DiskSpec::lba(1)
        };
        let drive = parsed(&spec);
        assert_eq!(drive.geometry.cylinders, 200);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let raw = block(&DiskSpec::lba(64).with_model("Conner CFS540A", "3BA0"));
        let mut once = Drive::absent();
        identify::parse(&raw, &mut once);
        let mut twice = once.clone();
        identify::parse(&raw, &mut twice);

        assert_eq!(once, twice);
        assert_eq!(twice.model_str(), "Conner CFS540A");
        assert_eq!(twice.firmware_str(), "3BA0");
    }

    // =========================================================================
    // ATA strings
    // =========================================================================

    #[test]
    fn test_string_is_byte_swapped_and_trimmed() {
        let mut raw = [0u8; 512];
        // "ABCD  " as ATA words: high byte first
        raw[0..2].copy_from_slice(&u16::from_be_bytes(*b"AB").to_le_bytes());
        raw[2..4].copy_from_slice(&u16::from_be_bytes(*b"CD").to_le_bytes());
        raw[4..6].copy_from_slice(&u16::from_be_bytes(*b"  ").to_le_bytes());

        let mut dst = [0xFFu8; 7];
        copy_string(&mut dst, &raw, 0, 3);
        assert_eq!(&dst, b"ABCD\0\0\0");
    }

    #[test]
    fn test_string_keeps_inner_spaces() {
        let drive = parsed(&DiskSpec::chs(10, 2, 17).with_model("A  B", "x"));
        assert_eq!(drive.model_str(), "A  B");
    }

    #[test]
    fn test_blank_string_is_empty() {
        let drive = parsed(&DiskSpec::chs(10, 2, 17).with_model("", ""));
        assert_eq!(drive.model_str(), "");
        assert_eq!(drive.firmware_str(), "");
        assert!(drive.model.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_full_length_model() {
        let name = "0123456789012345678901234567890123456789";
        let drive = parsed(&DiskSpec::lba(1).with_model(name, "12345678"));
        assert_eq!(drive.model_str(), name);
        assert_eq!(drive.firmware_str(), "12345678");
        assert_eq!(drive.model[40], 0);
    }

    // =========================================================================
    // IDENTIFY on the channel
    // =========================================================================

    #[test]
    fn test_identify_present_drive() {
        let ide = MockIde::with_disks(Some(DiskSpec::lba(100)), None);
        let clock = MockClock::new();
        let mut channel = PioChannel::new(ide.port(), clock.delay(), &mock::fast_config());
        let mut scratch = [0u8; 512];

        let drive = identify::identify(&mut channel, IdeDrive::Master, &mut scratch).unwrap();
        assert!(drive.present);
        assert_eq!(drive.partition_count(), 0);
        assert_eq!(scratch, block(&DiskSpec::lba(100)));
    }

    #[test]
    fn test_identify_absent_drive_times_out() {
        let ide = MockIde::with_disks(Some(DiskSpec::lba(100)), None);
        let clock = MockClock::new();
        let mut channel = PioChannel::new(ide.port(), clock.delay(), &mock::fast_config());
        let mut scratch = [0u8; 512];

        let err = identify::identify(&mut channel, IdeDrive::Slave, &mut scratch).unwrap_err();
        assert!(err.is_timeout());
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    #[test]
    fn test_discover_skips_absent_slave() {
        let ide = MockIde::with_disks(Some(DiskSpec::chs(615, 4, 17)), None);
        let clock = MockClock::new();
        let mut ctl = mock::controller(&ide, &clock, HostType::Castle, mock::fast_config());

        assert_eq!(ctl.discover(), Ok(1));
        assert!(ctl.drive(IdeDrive::Master).present);
        assert!(!ctl.drive(IdeDrive::Slave).present);
        assert_eq!(ctl.drive(IdeDrive::Slave).total_sectors, 0);
    }

    #[test]
    fn test_discover_both_drives() {
        let ide = MockIde::with_disks(
            Some(DiskSpec::lba(100)),
            Some(DiskSpec::chs(615, 4, 17).with_model("ST-157A", "B")),
        );
        let clock = MockClock::new();
        let mut ctl = mock::controller(&ide, &clock, HostType::Castle, mock::fast_config());

        assert_eq!(ctl.discover(), Ok(2));
        assert!(ctl.drive(IdeDrive::Master).lba);
        assert_eq!(ctl.drive(IdeDrive::Slave).model_str(), "ST-157A");
        assert_eq!(ctl.drive(IdeDrive::Slave).total_sectors, 615 * 4 * 17);
    }

    #[test]
    fn test_discover_twice_is_stable() {
        let ide = MockIde::with_disks(Some(DiskSpec::lba(100)), Some(DiskSpec::lba(50)));
        let clock = MockClock::new();
        let mut ctl = mock::controller(&ide, &clock, HostType::Castle, mock::fast_config());

        ctl.discover().unwrap();
        let first = ctl.drives().clone();
        ctl.discover().unwrap();
        assert_eq!(ctl.drives(), &first);
    }

    #[test]
    fn test_discover_no_drives() {
        let ide = MockIde::with_disks(None, None);
        let clock = MockClock::new();
        let mut ctl = mock::controller(&ide, &clock, HostType::Castle, mock::fast_config());

        assert_eq!(ctl.discover(), Ok(0));
    }

    #[test]
    fn test_discover_dead_card() {
        let ide = MockIde::with_disks(Some(DiskSpec::lba(100)), None);
        ide.set_dead(true);
        let clock = MockClock::new();
        let mut ctl = mock::controller(&ide, &clock, HostType::Castle, mock::fast_config());

        assert_eq!(ctl.discover(), Err(IdeError::RegisterAccess));
        assert!(!ctl.drive(IdeDrive::Master).present);
    }
}
