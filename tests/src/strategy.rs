//! Strategy Layer Tests
//!
//! Request validation, block-to-sector mapping, the FIFO queue, the retry
//! budget and both dispatch modes, end to end through the emulated drive.

#[cfg(test)]
mod tests {
    use crate::mock::{self, DiskSpec, Fault, MockClock, MockIde};
    use podule_ide::error::errno;
    use podule_ide::regs;
    use podule_ide::{
        Controller, ControllerId, DispatchMode, HostType, IdeConfig, IdeDrive, IdeError, IoBuf,
        Partition, Request, Target,
    };

    const ROOT: Target = Target::new(ControllerId(0), IdeDrive::Master, 0);

    fn table(parts: &[Partition]) -> [Partition; 8] {
        let mut table = [Partition::ABSENT; 8];
        table[..parts.len()].copy_from_slice(parts);
        table
    }

    /// LBA master with one partition of `size` sectors at sector 2048.
    fn lba_setup(config: IdeConfig, size: u32) -> (MockIde, Controller) {
        let ide = MockIde::with_disks(Some(DiskSpec::lba(100)), None);
        let clock = MockClock::new();
        let mut ctl = mock::controller(&ide, &clock, HostType::Castle, config);
        ctl.discover().unwrap();
        ctl.set_partitions(IdeDrive::Master, table(&[Partition::new(2048, size)]))
            .unwrap();
        (ide, ctl)
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    // =========================================================================
    // End to end
    // =========================================================================

    #[test]
    fn test_lba_write_then_read() {
        let (ide, mut ctl) = lba_setup(mock::fast_config(), 8192);
        let data = pattern(4096, 1);

        let id = ctl.submit(Request::write(ROOT, 0, &data));
        let done = ctl.pop_completion().unwrap();
        assert_eq!(done.id, id);
        assert!(done.is_ok());
        assert_eq!(done.transferred, 4096);
        assert_eq!(done.residual, 0);

        let cmds = ide.commands();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].command, regs::CMD_WRITE);
        assert!(cmds[0].lba_mode);
        assert_eq!(cmds[0].sector, 2048);
        assert_eq!(cmds[0].count(), 8);
        assert_eq!(ide.sector(0, 2048), data[..512]);
        assert_eq!(ide.sector(0, 2055), data[3584..]);

        ctl.submit(Request::read(ROOT, 0, 4096));
        let back = ctl.pop_completion().unwrap();
        assert!(back.is_ok());
        assert_eq!(back.buf.to_vec(), data);
        assert_eq!(ide.commands()[1].command, regs::CMD_READ);
    }

    #[test]
    fn test_block_offset_within_partition() {
        let (ide, mut ctl) = lba_setup(mock::fast_config(), 8192);

        ctl.submit(Request::read(ROOT, 100, 512));
        assert!(ctl.pop_completion().unwrap().is_ok());
        assert_eq!(ide.commands()[0].sector, 2148);
    }

    #[test]
    fn test_chs_write_then_read() {
        let ide = MockIde::with_disks(Some(DiskSpec::chs(100, 4, 56)), None);
        let clock = MockClock::new();
        let mut ctl = mock::controller(&ide, &clock, HostType::Castle, mock::fast_config());
        ctl.discover().unwrap();
        ctl.set_partitions(IdeDrive::Master, table(&[Partition::new(224, 1000)]))
            .unwrap();
        let data = pattern(1024, 7);

        ctl.submit(Request::write(ROOT, 0, &data));
        assert!(ctl.pop_completion().unwrap().is_ok());

        let cmd = ide.commands()[0];
        assert!(!cmd.lba_mode);
        assert_eq!((cmd.cylinder, cmd.head, cmd.sector_reg), (1, 0, 1));
        assert_eq!(ide.sector(0, 224), data[..512]);
        assert_eq!(ide.sector(0, 225), data[512..]);

        ctl.submit(Request::read(ROOT, 1, 512));
        let back = ctl.pop_completion().unwrap();
        assert_eq!(back.buf.to_vec(), data[512..]);
        assert_eq!(ide.commands()[1].sector_reg, 2);
    }

    #[test]
    fn test_large_request_is_chunked() {
        let config = IdeConfig {
            max_sectors_per_command: 8,
            ..mock::fast_config()
        };
        let (ide, mut ctl) = lba_setup(config, 8192);

        ctl.submit(Request::write(ROOT, 0, &pattern(20 * 512, 3)));
        assert!(ctl.pop_completion().unwrap().is_ok());
        assert_eq!(
            ide.commands().iter().map(|c| c.count()).collect::<Vec<_>>(),
            vec![8, 8, 4]
        );
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn test_partial_block_rejected() {
        let (ide, mut ctl) = lba_setup(mock::fast_config(), 8192);

        ctl.submit(Request::read(ROOT, 0, 100));
        let done = ctl.pop_completion().unwrap();
        assert_eq!(done.error, Some(IdeError::InvalidLength));
        assert_eq!(done.errno(), errno::EINVAL);
        assert_eq!(done.residual, 100);
        assert!(ide.commands().is_empty());
    }

    #[test]
    fn test_misaligned_buffer_rejected() {
        let (ide, mut ctl) = lba_setup(mock::fast_config(), 8192);
        let buf = IoBuf::zeroed_at(512, 1);
        assert!(!buf.is_word_aligned());

        ctl.submit(Request::with_buf(ROOT, 0, podule_ide::Direction::Read, buf));
        let done = ctl.pop_completion().unwrap();
        assert_eq!(done.error, Some(IdeError::Alignment));
        assert_eq!(done.errno(), errno::EINVAL);
        assert!(ide.commands().is_empty());
    }

    #[test]
    fn test_missing_partition_and_drive() {
        let (ide, mut ctl) = lba_setup(mock::fast_config(), 8192);

        ctl.submit(Request::read(Target::new(ControllerId(0), IdeDrive::Master, 3), 0, 512));
        ctl.submit(Request::read(Target::new(ControllerId(0), IdeDrive::Slave, 0), 0, 512));
        let errors: Vec<_> = ctl.take_completions().iter().map(|c| c.errno()).collect();
        assert_eq!(errors, vec![errno::ENXIO, errno::ENXIO]);
        assert!(ide.commands().is_empty());
    }

    #[test]
    fn test_read_at_end_of_partition_is_eof() {
        let (ide, mut ctl) = lba_setup(mock::fast_config(), 16);

        ctl.submit(Request::read(ROOT, 16, 1024));
        let done = ctl.pop_completion().unwrap();
        assert!(done.is_ok());
        assert_eq!(done.transferred, 0);
        assert_eq!(done.residual, 1024);
        assert!(ide.commands().is_empty());
    }

    #[test]
    fn test_request_past_end_rejected() {
        let (ide, mut ctl) = lba_setup(mock::fast_config(), 16);

        ctl.submit(Request::read(ROOT, 15, 1024));
        ctl.submit(Request::read(ROOT, 17, 512));
        for done in ctl.take_completions() {
            assert_eq!(done.error, Some(IdeError::OutOfRange));
            assert_eq!(done.errno(), errno::ENXIO);
        }
        assert!(ide.commands().is_empty());

        ctl.submit(Request::read(ROOT, 15, 512));
        assert!(ctl.pop_completion().unwrap().is_ok());
        assert_eq!(ide.commands()[0].sector, 2048 + 15);
    }

    #[test]
    fn test_zero_length_request() {
        let (ide, mut ctl) = lba_setup(mock::fast_config(), 16);

        ctl.submit(Request::read(ROOT, 0, 0));
        let done = ctl.pop_completion().unwrap();
        assert!(done.is_ok());
        assert_eq!(done.transferred, 0);
        assert!(ide.commands().is_empty());
    }

    #[test]
    fn test_read_only_partition() {
        let ide = MockIde::with_disks(Some(DiskSpec::lba(100)), None);
        let clock = MockClock::new();
        let mut ctl = mock::controller(&ide, &clock, HostType::Hccs, mock::fast_config());
        ctl.discover().unwrap();
        let ro = Partition {
            read_only: true,
            ..Partition::new(0, 64)
        };
        ctl.set_partitions(IdeDrive::Master, table(&[ro])).unwrap();

        assert_eq!(ctl.open(IdeDrive::Master, 0, true), Err(IdeError::ReadOnly));
        assert_eq!(ctl.open(IdeDrive::Master, 0, false), Ok(()));

        ctl.submit(Request::write(ROOT, 0, &[0u8; 512]));
        let done = ctl.pop_completion().unwrap();
        assert_eq!(done.errno(), errno::EROFS);

        ctl.submit(Request::read(ROOT, 0, 512));
        assert!(ctl.pop_completion().unwrap().is_ok());
        assert_eq!(ide.commands().len(), 1);
    }

    // =========================================================================
    // Block size
    // =========================================================================

    #[test]
    fn test_two_sector_blocks() {
        let config = IdeConfig {
            block_size: 1024,
            ..mock::fast_config()
        };
        let (ide, mut ctl) = lba_setup(config, 8192);
        assert_eq!(ctl.size(IdeDrive::Master, 0), Some(4096));
        assert_eq!(ctl.sector_size(), 1024);

        ctl.submit(Request::write(ROOT, 3, &pattern(2048, 9)));
        assert!(ctl.pop_completion().unwrap().is_ok());
        let cmd = ide.commands()[0];
        assert_eq!(cmd.sector, 2048 + 6);
        assert_eq!(cmd.count(), 4);

        ctl.submit(Request::read(ROOT, 0, 512));
        assert_eq!(
            ctl.pop_completion().unwrap().error,
            Some(IdeError::InvalidLength)
        );
    }

    // =========================================================================
    // Retries
    // =========================================================================

    #[test]
    fn test_transient_errors_are_retried() {
        let (ide, mut ctl) = lba_setup(mock::fast_config(), 8192);
        for _ in 0..4 {
            ide.inject(Fault::DeviceError(0x40));
        }
        let data = pattern(512, 5);

        ctl.submit(Request::write(ROOT, 0, &data));
        let done = ctl.pop_completion().unwrap();
        assert!(done.is_ok());
        assert_eq!(ide.commands().len(), 5);
        assert_eq!(ctl.retries(), 0);
        assert_eq!(ide.sector(0, 2048), data[..]);
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let (ide, mut ctl) = lba_setup(mock::fast_config(), 8192);
        for _ in 0..5 {
            ide.inject(Fault::DeviceError(0x40));
        }

        let failed = ctl.submit(Request::read(ROOT, 0, 512));
        let done = ctl.pop_completion().unwrap();
        assert_eq!(done.id, failed);
        assert_eq!(done.error, Some(IdeError::Io));
        assert_eq!(done.errno(), errno::EIO);
        assert_eq!(done.transferred, 0);
        assert!(ctl.pop_completion().is_none());
        assert_eq!(ide.commands().len(), 5);
        assert!(ctl.is_idle());

        // The next request starts with a fresh budget.
        ctl.submit(Request::read(ROOT, 0, 512));
        assert!(ctl.pop_completion().unwrap().is_ok());
        assert_eq!(ide.commands().len(), 6);
    }

    #[test]
    fn test_timeouts_count_against_budget() {
        let config = IdeConfig {
            retry_limit: 2,
            ..mock::fast_config()
        };
        let (ide, mut ctl) = lba_setup(config, 8192);
        ide.inject(Fault::NoDrq);
        ide.inject(Fault::NoDrq);

        ctl.submit(Request::read(ROOT, 0, 512));
        assert_eq!(ctl.pop_completion().unwrap().error, Some(IdeError::Io));
        assert_eq!(ide.commands().len(), 2);
    }

    #[test]
    fn test_retry_restarts_whole_request() {
        let (ide, mut ctl) = lba_setup(mock::fast_config(), 8192);
        ide.inject(Fault::ErrorAfter(2));
        let data = pattern(4 * 512, 11);

        ctl.submit(Request::write(ROOT, 0, &data));
        assert!(ctl.pop_completion().unwrap().is_ok());
        let cmds = ide.commands();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[1].sector, 2048);
        assert_eq!(cmds[1].count(), 4);
        assert_eq!(ide.sector(0, 2050), data[1024..1536]);
    }

    #[test]
    fn test_unaddressable_sector_not_retried() {
        let big = DiskSpec {
            lba_sectors: Some(regs::LBA28_MAX + 4097),
            ..DiskSpec::lba(100)
        };
        let ide = MockIde::with_disks(Some(big), None);
        let clock = MockClock::new();
        let mut ctl = mock::controller(&ide, &clock, HostType::Castle, mock::fast_config());
        ctl.discover().unwrap();
        ctl.set_partitions(
            IdeDrive::Master,
            table(&[Partition::new(regs::LBA28_MAX - 3, 64)]),
        )
        .unwrap();
        ide.clear_commands();

        ctl.submit(Request::read(ROOT, 0, 4096));
        let done = ctl.pop_completion().unwrap();
        assert_eq!(done.error, Some(IdeError::BadGeometry));
        assert_eq!(done.errno(), errno::EINVAL);
        assert_eq!(done.transferred, 0);
        assert!(ide.commands().is_empty());
        assert_eq!(ctl.retries(), 0);
        assert!(ctl.is_idle());

        ctl.submit(Request::read(ROOT, 0, 2048));
        assert!(ctl.pop_completion().unwrap().is_ok());
        assert_eq!(ide.commands().len(), 1);
    }

    // =========================================================================
    // Deferred dispatch
    // =========================================================================

    fn deferred() -> IdeConfig {
        IdeConfig {
            dispatch: DispatchMode::Deferred,
            ..mock::fast_config()
        }
    }

    #[test]
    fn test_deferred_requests_run_in_order() {
        let (ide, mut ctl) = lba_setup(deferred(), 8192);

        let ids: Vec<_> = [30u32, 10, 20]
            .iter()
            .map(|&block| ctl.submit(Request::read(ROOT, block, 512)))
            .collect();
        assert_eq!(ctl.queue_len(), 3);
        assert!(ide.commands().is_empty());
        assert!(ctl.pop_completion().is_none());

        assert!(ctl.service());
        assert!(ctl.service());
        assert!(!ctl.service());
        assert!(!ctl.service());

        let sectors: Vec<_> = ide.commands().iter().map(|c| c.sector).collect();
        assert_eq!(sectors, vec![2078, 2058, 2068]);
        let done: Vec<_> = ctl.take_completions().iter().map(|c| c.id).collect();
        assert_eq!(done, ids);
    }

    #[test]
    fn test_deferred_retry_keeps_head() {
        let (ide, mut ctl) = lba_setup(deferred(), 8192);
        ide.inject(Fault::DeviceError(0x40));

        ctl.submit(Request::read(ROOT, 0, 512));
        ctl.submit(Request::read(ROOT, 1, 512));

        assert!(ctl.service());
        assert_eq!(ctl.retries(), 1);
        assert_eq!(ctl.queue_len(), 2);
        assert!(ctl.pop_completion().is_none());

        ctl.run_queue();
        let sectors: Vec<_> = ide.commands().iter().map(|c| c.sector).collect();
        assert_eq!(sectors, vec![2048, 2048, 2049]);
        assert_eq!(ctl.take_completions().len(), 2);
    }

    #[test]
    fn test_deferred_invalid_request_completes_at_submit() {
        let (_ide, mut ctl) = lba_setup(deferred(), 8192);

        ctl.submit(Request::read(ROOT, 0, 100));
        assert_eq!(ctl.queue_len(), 0);
        assert_eq!(
            ctl.pop_completion().unwrap().error,
            Some(IdeError::InvalidLength)
        );
    }

    #[test]
    fn test_partition_removed_while_queued() {
        let (ide, mut ctl) = lba_setup(deferred(), 8192);

        ctl.submit(Request::read(ROOT, 0, 512));
        ctl.set_partitions(IdeDrive::Master, [Partition::ABSENT; 8])
            .unwrap();
        assert!(!ctl.service());

        assert_eq!(
            ctl.pop_completion().unwrap().error,
            Some(IdeError::NoDevice)
        );
        assert!(ide.commands().is_empty());
    }

    #[test]
    fn test_fail_pending() {
        let (ide, mut ctl) = lba_setup(deferred(), 8192);
        ctl.submit(Request::read(ROOT, 0, 512));
        ctl.submit(Request::read(ROOT, 1, 512));

        ctl.fail_pending(IdeError::NoDevice);
        assert!(ctl.is_idle());
        let done = ctl.take_completions();
        assert_eq!(done.len(), 2);
        assert!(done.iter().all(|c| c.errno() == errno::ENXIO && c.residual == 512));
        assert!(ide.commands().is_empty());
    }

    #[test]
    fn test_take_completion_by_id() {
        let (_ide, mut ctl) = lba_setup(deferred(), 8192);
        let first = ctl.submit(Request::read(ROOT, 0, 512));
        let second = ctl.submit(Request::read(ROOT, 1, 512));
        ctl.run_queue();

        assert_eq!(ctl.take_completion(second).unwrap().id, second);
        assert!(ctl.take_completion(second).is_none());
        assert_eq!(ctl.take_completion(first).unwrap().id, first);
    }
}
