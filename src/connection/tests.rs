//! Connection behaviour against the emulated firmware
//!
//! Control-plane tests run one dialect end to end: encode, emulated device, decode.
//! Streaming tests pair the control emulator with scripted sample pipes.

use super::*;
use crate::config::SpiSlaveKind;
use crate::protocol::{Command, CommandStatus, Dialect};
use crate::stream::{SamplePacket, StreamDirection, StreamState};
use crate::test_utils::{EmulatedDevice, SamplePipe, single_rfic_config};
use crate::transport::LogDirection;
use crate::types::{OperationStatus, TransferStatus};
use std::sync::{Arc, Mutex};

const RFIC: u32 = 0;
const BOARD: u32 = 1;
const CLOCK: u32 = 2;

fn connect(dialect: Dialect) -> (PacketConnection, EmulatedDevice) {
    let _ = tracing_subscriber::fmt::try_init();
    let device = EmulatedDevice::new(dialect);
    let connection = PacketConnection::new(single_rfic_config(dialect), Box::new(device.clone())).unwrap();
    device.clear_history();
    (connection, device)
}

mod control {
    use super::*;
    use crate::connection::spi::{WRITE_FLAG, read_word, write_word};

    #[test]
    fn probe_fills_device_info() {
        let device = EmulatedDevice::new(Dialect::Lms64c);
        let connection = PacketConnection::new(single_rfic_config(Dialect::Lms64c), Box::new(device.clone())).unwrap();

        assert!(connection.is_open());
        assert_eq!(device.commands(), vec![Command::GET_INFO]);

        let info = connection.device_info();
        assert_eq!(info.device_name, "LimeSDR-USB");
        assert_eq!(info.expansion_name, "NOT AVAILABLE");
        assert_eq!(info.firmware_version, "3");
        assert_eq!(info.protocol_version, "1");
        assert_eq!(info.hardware_version, "4");
    }

    #[test]
    fn refresh_replaces_cached_info() {
        let (connection, device) = connect(Dialect::Lms64c);
        device.set_info([5, 9, 1, 2, 1]);

        let info = connection.refresh_device_info().unwrap();
        assert_eq!(info.firmware_version, "5");
        assert_eq!(connection.device_info(), info);
    }

    #[test]
    fn silent_device_yields_closed_connection() {
        let device = EmulatedDevice::new(Dialect::Lms64c);
        device.set_silent(true);
        let connection = PacketConnection::new(single_rfic_config(Dialect::Lms64c), Box::new(device.clone())).unwrap();

        assert!(!connection.is_open());
        assert_eq!(connection.device_info(), crate::types::DeviceInfo::default());

        let written = device.frames_written();
        let err = connection.transact_spi(RFIC, &[write_word(1, 1)], None).unwrap_err();
        assert!(matches!(err, ConnectionError::Disconnected));
        assert_eq!(device.frames_written(), written);
    }

    #[test]
    fn invalid_config_is_rejected_before_io() {
        let device = EmulatedDevice::new(Dialect::Lms64c);
        let mut config = single_rfic_config(Dialect::Lms64c);
        config.control_timeout_ms = 0;

        let err = PacketConnection::new(config, Box::new(device.clone())).unwrap_err();
        assert!(matches!(err, ConnectionError::Config { .. }));
        assert_eq!(device.frames_written(), 0);
    }

    #[test]
    fn rfics_come_from_the_profile() {
        let (connection, _device) = connect(Dialect::Lms64c);
        let rfics = connection.list_rfics();
        assert_eq!(rfics.len(), 1);
        assert_eq!(rfics[0].spi_index_rfic, RFIC);
        assert_eq!(rfics[0].spi_index_si5351, Some(CLOCK));
    }

    #[test]
    fn writes_are_batched_per_frame() {
        let (connection, device) = connect(Dialect::Lms64c);
        let words: Vec<u32> = (0..30u16).map(|i| write_word(0x0040 + i, i * 3)).collect();

        connection.transact_spi(RFIC, &words, None).unwrap();

        // 56 payload bytes hold 14 four-byte writes
        assert_eq!(device.frames_written(), 3);
        let sizes: Vec<usize> = device.requests().iter().map(|request| request.in_buffer.len()).collect();
        assert_eq!(sizes, vec![56, 56, 8]);
        for i in 0..30u16 {
            assert_eq!(device.register(SpiSlaveKind::Rfic, 0, 0x0040 + i), Some(i * 3));
        }
    }

    #[test]
    fn reads_fill_matching_positions() {
        let (connection, device) = connect(Dialect::Lms64c);
        device.set_register(SpiSlaveKind::Rfic, 0, 0x0002, 0x0055);

        let words = [write_word(0x0001, 0xAAAA), read_word(0x0001), read_word(0x0002)];
        let mut read = [0xFFFF_FFFFu32; 3];
        connection.transact_spi(RFIC, &words, Some(&mut read)).unwrap();

        assert_eq!(read, [0xFFFF_FFFF, 0xAAAA, 0x0055]);
        assert_eq!(device.commands(), vec![Command::LMS7002_WR, Command::LMS7002_RD]);
    }

    #[test]
    fn reads_without_buffer_are_skipped() {
        let (connection, device) = connect(Dialect::Lms64c);
        let words = [read_word(0x0001), write_word(0x0001, 5), read_word(0x0002)];

        connection.transact_spi(RFIC, &words, None).unwrap();

        assert_eq!(device.commands(), vec![Command::LMS7002_WR]);
        assert_eq!(device.register(SpiSlaveKind::Rfic, 0, 0x0001), Some(5));
    }

    #[test]
    fn empty_transaction_does_no_io() {
        let (connection, device) = connect(Dialect::Lms64c);
        connection.transact_spi(RFIC, &[], None).unwrap();
        assert_eq!(device.frames_written(), 0);
    }

    #[test]
    fn unknown_index_is_unsupported() {
        let (connection, device) = connect(Dialect::Lms64c);
        let result = connection.transact_spi(7, &[write_word(1, 1)], None);

        assert!(matches!(result, Err(ConnectionError::Unsupported { .. })));
        assert_eq!(OperationStatus::from(&result), OperationStatus::Unsupported);
        assert_eq!(device.frames_written(), 0);
    }

    #[test]
    fn short_read_buffer_is_invalid() {
        let (connection, device) = connect(Dialect::Lms64c);
        let mut read = [0u32; 1];
        let err = connection.transact_spi(RFIC, &[read_word(1), read_word(2)], Some(&mut read)).unwrap_err();

        assert!(matches!(err, ConnectionError::InvalidArgument { .. }));
        assert_eq!(device.frames_written(), 0);
    }

    #[test]
    fn si5351_uses_byte_registers() {
        let (connection, device) = connect(Dialect::Lms64c);
        let words = [WRITE_FLAG | 0x10_2A, 0x0000_1000];
        let mut read = [0u32; 2];

        connection.transact_spi(CLOCK, &words, Some(&mut read)).unwrap();

        assert_eq!(read[1], 0x2A);
        assert_eq!(device.register(SpiSlaveKind::Si5351, 0, 0x10), Some(0x2A));
        assert_eq!(device.commands(), vec![Command::SI5351_WR, Command::SI5351_RD]);
    }

    #[test]
    fn board_and_rfic_registers_are_separate() {
        let (connection, device) = connect(Dialect::Lms64c);
        connection.transact_spi(BOARD, &[write_word(0x0003, 0x1111)], None).unwrap();

        assert_eq!(device.register(SpiSlaveKind::Board, 0, 0x0003), Some(0x1111));
        assert_eq!(device.register(SpiSlaveKind::Rfic, 0, 0x0003), None);
    }

    #[test]
    fn second_rfic_is_addressed_by_peripheral_id() {
        let device = EmulatedDevice::new(Dialect::Lms64c);
        let mut config = single_rfic_config(Dialect::Lms64c);
        config.spi_slaves.insert(4, SpiSlaveKind::Rfic);
        config.rfics.push(crate::types::RficInfo::new(4).with_channels(Some(1), Some(1)));
        let connection = PacketConnection::new(config, Box::new(device.clone())).unwrap();

        connection.transact_spi(4, &[write_word(0x0020, 0xBEEF)], None).unwrap();

        assert_eq!(device.register(SpiSlaveKind::Rfic, 1, 0x0020), Some(0xBEEF));
        assert_eq!(device.register(SpiSlaveKind::Rfic, 0, 0x0020), None);
    }

    #[test]
    fn rejected_command_reports_status() {
        let (connection, device) = connect(Dialect::Lms64c);
        device.set_status_override(Some(CommandStatus::Busy));

        let err = connection.device_reset().unwrap_err();
        match err {
            ConnectionError::CommandRejected { command, status } => {
                assert_eq!(command, Command::LMS7002_RST);
                assert_eq!(status, CommandStatus::Busy);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(connection.device_reset().unwrap_err().is_retryable());
    }

    #[test]
    fn reset_sends_reset_pulse() {
        let (connection, device) = connect(Dialect::Lms64c);
        connection.device_reset().unwrap();

        let requests = device.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].cmd, Command::LMS7002_RST);
        assert_eq!(requests[0].in_buffer, vec![2]);
        assert_eq!(device.resets(), 1);
    }

    #[test]
    fn transfer_packet_returns_raw_status() {
        let (connection, _device) = connect(Dialect::Lms64c);
        let mut packet = GenericPacket::new(Command::MEMORY_RD);

        let result = connection.transfer_packet(&mut packet);
        assert_eq!(TransferStatus::from(&result), TransferStatus::TransferSuccess);
        assert_eq!(packet.status, Some(CommandStatus::UnknownCommand));
        assert!(!packet.is_completed());
    }

    #[test]
    fn lost_link_closes_connection() {
        let (connection, device) = connect(Dialect::Lms64c);
        device.disconnect();

        let result = connection.device_reset();
        assert!(matches!(result, Err(ConnectionError::Disconnected)));
        assert_eq!(OperationStatus::from(&result), OperationStatus::Disconnected);
        assert!(!connection.is_open());

        let mut packet = GenericPacket::default();
        assert_eq!(TransferStatus::from(&connection.transfer_packet(&mut packet)), TransferStatus::NotConnected);
    }

    #[test]
    fn closed_connection_fails_transactions_before_checking_them() {
        let (connection, device) = connect(Dialect::Lms64c);
        device.disconnect();

        let unknown = connection.transact_spi(7, &[write_word(1, 1)], None);
        assert!(matches!(unknown, Err(ConnectionError::Disconnected)));
        let mut read = [0u32; 1];
        let short = connection.transact_spi(RFIC, &[read_word(1), read_word(2)], Some(&mut read));
        assert!(matches!(short, Err(ConnectionError::Disconnected)));

        connection.transact_spi(RFIC, &[], None).unwrap();
        assert_eq!(device.frames_written(), 0);
    }

    #[test]
    fn unanswered_request_times_out() {
        let (connection, device) = connect(Dialect::Lms64c);
        device.set_silent(true);

        let err = connection.device_reset().unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
        assert!(connection.is_open());
    }

    #[test]
    fn digic_batches_into_sixty_bytes() {
        let dialect = Dialect::Digic { i2c_address: 0x22 };
        let (connection, device) = connect(dialect);
        assert!(connection.is_open());
        assert_eq!(connection.device_info().device_name, "LimeSDR-USB");

        let words: Vec<u32> = (0..16u16).map(|i| write_word(i, i)).collect();
        connection.transact_spi(RFIC, &words, None).unwrap();
        assert_eq!(device.frames_written(), 2);

        // DIGIC carries no status, so a would-be rejection still succeeds
        device.set_status_override(Some(CommandStatus::Error));
        connection.device_reset().unwrap();
    }

    #[test]
    fn novena_reads_back_registers() {
        let (connection, device) = connect(Dialect::Novena);
        let words: Vec<u32> = (0..40u16).map(|i| write_word(0x0100 + i, 0x8000 | i)).collect();
        connection.transact_spi(RFIC, &words, None).unwrap();
        // 125 payload bytes hold 31 four-byte writes
        assert_eq!(device.frames_written(), 2);

        let reads: Vec<u32> = (0..40u16).map(|i| read_word(0x0100 + i)).collect();
        let mut values = vec![0u32; reads.len()];
        connection.transact_spi(RFIC, &reads, Some(&mut values)).unwrap();
        let expected: Vec<u32> = (0..40u32).map(|i| 0x8000 | i).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn band_select_writes_board_register() {
        let (connection, device) = connect(Dialect::Lms64c);
        connection.update_external_band_select(2, 1);

        assert_eq!(device.register(SpiSlaveKind::Board, 0, 0x0017), Some(0b0110));
        assert_eq!(device.commands(), vec![Command::BRDSPI_WR]);
    }

    #[test]
    fn band_select_failures_are_swallowed() {
        let (connection, device) = connect(Dialect::Lms64c);
        device.set_status_override(Some(CommandStatus::Error));
        connection.update_external_band_select(1, 1);
        assert_eq!(device.frames_written(), 1);
    }

    #[test]
    fn reference_clock_programs_the_synthesizer() {
        let (connection, device) = connect(Dialect::Lms64c);
        assert_eq!(connection.reference_clock_rate(), 30.72e6);

        connection.set_reference_clock_rate(40e6);
        assert_eq!(connection.reference_clock_rate(), 40e6);
        assert_eq!(device.commands(), vec![Command::SI5351_WR]);

        // PLLA multiplier, Multisynth 0 divider, CLK0 control, PLLA reset
        let clock = |address| device.register(SpiSlaveKind::Si5351, 0, address);
        assert_eq!(clock(26), Some(0xFF));
        assert_eq!(clock(29), Some(0x0F));
        assert_eq!(clock(30), Some(0x99));
        assert_eq!(clock(45), Some(0x09));
        assert_eq!(clock(16), Some(0x4F));
        assert_eq!(clock(177), Some(0x20));
    }

    #[test]
    fn rejected_clock_rates_keep_the_previous_rate() {
        let (connection, device) = connect(Dialect::Lms64c);
        connection.set_reference_clock_rate(f64::NAN);
        connection.set_reference_clock_rate(-1.0);
        connection.set_reference_clock_rate(200e6);
        assert_eq!(device.frames_written(), 0);

        device.set_status_override(Some(CommandStatus::Error));
        connection.set_reference_clock_rate(40e6);
        assert_eq!(device.frames_written(), 1);
        assert_eq!(connection.reference_clock_rate(), 30.72e6);
    }

    #[test]
    fn fixed_reference_ignores_rate_changes() {
        let device = EmulatedDevice::new(Dialect::Lms64c);
        let mut config = single_rfic_config(Dialect::Lms64c);
        config.reference_clock.programmable = false;
        let fixed = PacketConnection::new(config, Box::new(device.clone())).unwrap();
        device.clear_history();

        fixed.set_reference_clock_rate(40e6);
        assert_eq!(fixed.reference_clock_rate(), 30.72e6);
        assert_eq!(device.frames_written(), 0);
    }

    #[test]
    fn data_log_sees_every_frame() {
        let (connection, _device) = connect(Dialect::Lms64c);
        let seen: Arc<Mutex<Vec<(LogDirection, usize, u8)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let callback: DataLogCallback = Arc::new(move |direction: LogDirection, bytes: &[u8]| {
            sink.lock().unwrap().push((direction, bytes.len(), bytes[0]));
        });
        connection.set_data_log_callback(Some(callback));

        connection.device_reset().unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(LogDirection::Tx, 64, Command::LMS7002_RST.0), (LogDirection::Rx, 64, Command::LMS7002_RST.0)]
        );

        connection.set_data_log_callback(None);
        connection.device_reset().unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn default_trait_methods_describe_no_hardware() {
        struct Nothing;
        impl Connection for Nothing {}

        let nothing = Nothing;
        assert!(!nothing.is_open());
        assert!(nothing.list_rfics().is_empty());
        assert_eq!(nothing.reference_clock_rate(), 30.72e6);
        assert!(matches!(nothing.device_reset(), Err(ConnectionError::Unsupported { .. })));
        assert!(matches!(nothing.transact_spi(0, &[], None), Err(ConnectionError::Unsupported { .. })));
        nothing.update_external_band_select(1, 1);
        nothing.set_reference_clock_rate(1.0);
        assert_eq!(nothing.reference_clock_rate(), 30.72e6);
    }
}

mod streaming {
    use super::*;
    use crate::connection::spi::write_word;
    use crate::stream::control::{CTRL_BURST, CTRL_ENABLE, CTRL_TIMED_START};
    use std::time::Duration;

    const PACKET_SIZE: usize = 64;
    const SHORT: Duration = Duration::from_millis(5);

    struct Rig {
        connection: PacketConnection,
        device: EmulatedDevice,
        rx: SamplePipe,
        tx: SamplePipe,
    }

    fn rig() -> Rig {
        let _ = tracing_subscriber::fmt::try_init();
        let device = EmulatedDevice::new(Dialect::Lms64c);
        let rx = SamplePipe::new();
        let tx = SamplePipe::new();
        let mut config = single_rfic_config(Dialect::Lms64c);
        config.stream.packet_size = PACKET_SIZE;
        config.spi_slaves.insert(4, SpiSlaveKind::Rfic);
        config.rfics.push(crate::types::RficInfo::new(4).with_channels(Some(1), Some(1)));

        let connection = PacketConnection::new(config, Box::new(device.clone()))
            .unwrap()
            .with_rx_pipe(Box::new(rx.clone()))
            .with_tx_pipe(Box::new(tx.clone()));
        device.clear_history();
        Rig { connection, device, rx, tx }
    }

    fn samples(stream_id: u8, timestamp: Option<u64>, end_of_burst: bool, values: &[u8]) -> SamplePacket {
        SamplePacket { stream_id, timestamp, end_of_burst, payload: values.iter().flat_map(|v| [*v; 4]).collect() }
    }

    #[test]
    fn burst_request_programs_stream_registers() {
        let rig = rig();
        rig.connection.rx_stream_control(0, 1000, &StreamMetadata::default().with_end_of_burst(true)).unwrap();

        assert_eq!(rig.device.register(SpiSlaveKind::Board, 0, 0x0101), Some(1000));
        assert_eq!(rig.device.register(SpiSlaveKind::Board, 0, 0x0102), Some(0));
        assert_eq!(rig.device.register(SpiSlaveKind::Board, 0, 0x0100), Some(CTRL_ENABLE | CTRL_BURST));
        assert_eq!(rig.connection.stream_state(StreamDirection::Rx, 0), Some(StreamState::Running));
    }

    #[test]
    fn timed_start_arms_until_first_packet() {
        let rig = rig();
        rig.connection.rx_stream_control(1, 8, &StreamMetadata::at(0x1_0000_0002)).unwrap();

        assert_eq!(rig.device.register(SpiSlaveKind::Board, 0, 0x0113), Some(2));
        assert_eq!(rig.device.register(SpiSlaveKind::Board, 0, 0x0114), Some(0));
        assert_eq!(rig.device.register(SpiSlaveKind::Board, 0, 0x0115), Some(1));
        assert_eq!(rig.device.register(SpiSlaveKind::Board, 0, 0x0110), Some(CTRL_ENABLE | CTRL_TIMED_START));
        assert_eq!(rig.connection.stream_state(StreamDirection::Rx, 1), Some(StreamState::Armed));

        rig.rx.queue(&samples(1, Some(0x1_0000_0002), false, &[7]), PACKET_SIZE);
        let mut buf = [0u8; 4];
        let mut metadata = StreamMetadata::default();
        rig.connection.read_stream(1, &mut [&mut buf[..]], SHORT, &mut metadata).unwrap();
        assert_eq!(rig.connection.stream_state(StreamDirection::Rx, 1), Some(StreamState::Running));
        assert_eq!(metadata.timestamp, Some(0x1_0000_0002));
    }

    #[test]
    fn stop_clears_control_only() {
        let rig = rig();
        rig.device.set_register(SpiSlaveKind::Board, 0, 0x0101, 77);
        rig.connection.rx_stream_control(0, 0, &StreamMetadata::default()).unwrap();

        assert_eq!(rig.device.register(SpiSlaveKind::Board, 0, 0x0100), Some(0));
        assert_eq!(rig.device.register(SpiSlaveKind::Board, 0, 0x0101), Some(77));
        let stop = write_word(0x0100, 0) & !crate::connection::spi::WRITE_FLAG;
        assert_eq!(rig.device.requests()[0].in_buffer, stop.to_be_bytes().to_vec());
        assert_eq!(rig.connection.stream_state(StreamDirection::Rx, 0), Some(StreamState::Idle));
    }

    #[test]
    fn rejected_control_marks_stream_failed() {
        let rig = rig();
        rig.device.set_status_override(Some(CommandStatus::Error));
        assert!(rig.connection.rx_stream_control(0, 16, &StreamMetadata::default()).is_err());
        assert_eq!(rig.connection.stream_state(StreamDirection::Rx, 0), Some(StreamState::Error));

        let mut buf = [0u8; 4];
        let err = rig
            .connection
            .read_stream(0, &mut [&mut buf[..]], SHORT, &mut StreamMetadata::default())
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Failed { .. }));

        rig.device.set_status_override(None);
        rig.connection.rx_stream_control(0, 16, &StreamMetadata::default()).unwrap();
        assert_eq!(rig.connection.stream_state(StreamDirection::Rx, 0), Some(StreamState::Running));
    }

    #[test]
    fn unknown_streams_are_unsupported() {
        let rig = rig();
        assert!(matches!(
            rig.connection.rx_stream_control(9, 1, &StreamMetadata::default()),
            Err(ConnectionError::Unsupported { .. })
        ));
        assert!(matches!(
            rig.connection.write_stream(9, &[&[0u8; 4][..]], SHORT, &StreamMetadata::default()),
            Err(ConnectionError::Unsupported { .. })
        ));
        assert_eq!(rig.connection.stream_state(StreamDirection::Tx, 9), None);
    }

    #[test]
    fn read_spans_packets_and_keeps_the_rest() {
        let rig = rig();
        rig.rx.queue(&samples(0, Some(100), false, &[1, 2, 3]), PACKET_SIZE);
        rig.rx.queue(&samples(0, Some(103), false, &[4, 5, 6]), PACKET_SIZE);

        let mut buf = [0u8; 16];
        let mut metadata = StreamMetadata::default();
        let read = rig.connection.read_stream(0, &mut [&mut buf[..]], SHORT, &mut metadata).unwrap();
        assert_eq!(read, 16);
        assert_eq!(buf, [1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4]);
        assert_eq!(metadata.timestamp, Some(100));

        let mut rest = [0u8; 8];
        rig.connection.read_stream(0, &mut [&mut rest[..]], SHORT, &mut metadata).unwrap();
        assert_eq!(rest, [5, 5, 5, 5, 6, 6, 6, 6]);
        assert_eq!(metadata.timestamp, Some(104));
    }

    #[test]
    fn read_timeout_keeps_buffered_samples() {
        let rig = rig();
        rig.rx.queue(&samples(0, None, false, &[9]), PACKET_SIZE);

        let mut buf = [0u8; 8];
        let mut metadata = StreamMetadata::default();
        let err = rig.connection.read_stream(0, &mut [&mut buf[..]], Duration::ZERO, &mut metadata).unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));

        rig.rx.queue(&samples(0, None, false, &[8]), PACKET_SIZE);
        rig.connection.read_stream(0, &mut [&mut buf[..]], SHORT, &mut metadata).unwrap();
        assert_eq!(buf, [9, 9, 9, 9, 8, 8, 8, 8]);
    }

    #[test]
    fn end_of_burst_cuts_the_read_short() {
        let rig = rig();
        rig.connection.rx_stream_control(0, 2, &StreamMetadata::default().with_end_of_burst(true)).unwrap();
        rig.rx.queue(&samples(0, Some(10), true, &[1, 2]), PACKET_SIZE);

        let mut buf = [0u8; 16];
        let mut metadata = StreamMetadata::default();
        let read = rig.connection.read_stream(0, &mut [&mut buf[..]], SHORT, &mut metadata).unwrap();
        assert_eq!(read, 8);
        assert!(metadata.end_of_burst);
        assert_eq!(rig.connection.stream_state(StreamDirection::Rx, 0), Some(StreamState::Idle));
    }

    #[test]
    fn hundred_sample_burst_reads_exactly_and_idles() {
        let rig = rig();
        rig.connection.rx_stream_control(0, 100, &StreamMetadata::default().with_end_of_burst(true)).unwrap();

        // 12 samples per 64-byte packet
        let mut sent = 0u8;
        while sent < 100 {
            let count = (100 - sent).min(12);
            let values: Vec<u8> = (sent..sent + count).collect();
            rig.rx.queue(&samples(0, Some(u64::from(sent)), sent + count == 100, &values), PACKET_SIZE);
            sent += count;
        }

        let mut buf = vec![0u8; 4096];
        let mut metadata = StreamMetadata::default();
        let read = rig.connection.read_stream(0, &mut [&mut buf[..]], SHORT, &mut metadata).unwrap();

        assert_eq!(read, 400);
        assert!(metadata.end_of_burst);
        assert_eq!(metadata.timestamp, Some(0));
        assert_eq!(buf[396..400], [99; 4]);
        assert_eq!(rig.connection.stream_state(StreamDirection::Rx, 0), Some(StreamState::Idle));
    }

    #[test]
    fn zero_timeout_never_blocks() {
        let rig = rig();
        let mut buf = [0u8; 4];
        let err = rig
            .connection
            .read_stream(0, &mut [&mut buf[..]], Duration::ZERO, &mut StreamMetadata::default())
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));

        rig.tx.limit_tx(Some(0));
        let err = rig.connection.write_stream(0, &[&buf[..]], Duration::ZERO, &StreamMetadata::default()).unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
    }

    #[test]
    fn closed_connection_reads_nothing() {
        let rig = rig();
        rig.rx.queue(&samples(0, None, false, &[1]), PACKET_SIZE);
        rig.device.disconnect();

        let mut buf = [0u8; 4];
        let err = rig
            .connection
            .read_stream(0, &mut [&mut buf[..]], SHORT, &mut StreamMetadata::default())
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Disconnected));
        assert_eq!(rig.rx.queued(), 1);
    }

    #[test]
    fn packets_for_the_other_stream_wait_their_turn() {
        let rig = rig();
        rig.rx.queue(&samples(1, None, false, &[0x11]), PACKET_SIZE);
        rig.rx.queue(&samples(0, None, false, &[0x22]), PACKET_SIZE);

        let mut buf = [0u8; 4];
        let mut metadata = StreamMetadata::default();
        rig.connection.read_stream(0, &mut [&mut buf[..]], SHORT, &mut metadata).unwrap();
        assert_eq!(buf, [0x22; 4]);
        rig.connection.read_stream(1, &mut [&mut buf[..]], SHORT, &mut metadata).unwrap();
        assert_eq!(buf, [0x11; 4]);
    }

    #[test]
    fn malformed_packet_fails_the_stream() {
        let rig = rig();
        let mut bytes = vec![0u8; PACKET_SIZE];
        bytes[2..4].copy_from_slice(&500u16.to_le_bytes());
        rig.rx.queue_raw(bytes);

        let mut buf = [0u8; 4];
        let err = rig
            .connection
            .read_stream(0, &mut [&mut buf[..]], SHORT, &mut StreamMetadata::default())
            .unwrap_err();
        assert!(matches!(err, ConnectionError::MalformedFrame { .. }));
        assert_eq!(rig.connection.stream_state(StreamDirection::Rx, 0), Some(StreamState::Error));
        assert!(rig.connection.is_open());
    }

    #[test]
    fn mismatched_buffers_are_invalid() {
        let rig = rig();
        let mut a = [0u8; 8];
        let mut b = [0u8; 4];
        let err = rig
            .connection
            .read_stream(0, &mut [&mut a[..], &mut b[..]], SHORT, &mut StreamMetadata::default())
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidArgument { .. }));

        let err = rig.connection.write_stream(0, &[&[0u8; 6][..]], SHORT, &StreamMetadata::default()).unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidArgument { .. }));

        let err = rig.connection.write_stream(0, &[], SHORT, &StreamMetadata::default()).unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidArgument { .. }));
    }

    #[test]
    fn write_splits_into_packets_and_marks_last() {
        let rig = rig();
        // 48 payload bytes per 64-byte packet: 12 samples of 4 bytes
        let data: Vec<u8> = (0..100u8).flat_map(|v| [v; 4]).collect();
        let metadata = StreamMetadata::at(1_000).with_end_of_burst(true);

        let written = rig.connection.write_stream(0, &[&data[..]], SHORT, &metadata).unwrap();
        assert_eq!(written, 400);

        let sent = rig.tx.sent();
        assert_eq!(sent.len(), 9);
        assert!(sent.iter().all(|packet| packet.stream_id == 0));
        assert_eq!(sent[0].timestamp, Some(1_000));
        assert_eq!(sent[1].timestamp, Some(1_012));
        assert_eq!(sent[8].payload.len(), 16);
        assert!(sent[8].end_of_burst);
        assert!(sent[..8].iter().all(|packet| !packet.end_of_burst));
        assert_eq!(rig.connection.stream_state(StreamDirection::Tx, 0), Some(StreamState::Idle));
    }

    #[test]
    fn write_timestamps_wrap_at_counter_end() {
        let rig = rig();
        let data = [0u8; 96];
        let written = rig.connection.write_stream(0, &[&data[..]], SHORT, &StreamMetadata::at(u64::MAX)).unwrap();
        assert_eq!(written, 96);

        let sent = rig.tx.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].timestamp, Some(u64::MAX));
        assert_eq!(sent[1].timestamp, Some(11));
    }

    #[test]
    fn refused_write_leaves_stream_state() {
        let rig = rig();
        let buf = [0u8; 4];
        rig.tx.limit_tx(Some(0));
        assert_eq!(rig.connection.stream_state(StreamDirection::Tx, 0), Some(StreamState::Idle));

        let err = rig.connection.write_stream(0, &[&buf[..]], Duration::ZERO, &StreamMetadata::default()).unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
        assert_eq!(rig.connection.stream_state(StreamDirection::Tx, 0), Some(StreamState::Idle));

        rig.tx.limit_tx(None);
        rig.connection.write_stream(0, &[&buf[..]], SHORT, &StreamMetadata::default()).unwrap();
        assert_eq!(rig.connection.stream_state(StreamDirection::Tx, 0), Some(StreamState::Running));
    }

    #[test]
    fn streaming_does_not_wait_for_the_control_plane() {
        let Rig { connection, device, .. } = rig();
        let connection = Arc::new(connection);
        device.set_reply_delay(Duration::from_millis(300));

        let control = {
            let connection = Arc::clone(&connection);
            std::thread::spawn(move || connection.transact_spi(RFIC, &[write_word(0x0020, 1)], None))
        };
        while device.frames_written() == 0 {
            std::thread::yield_now();
        }

        let started = std::time::Instant::now();
        let mut buf = [0u8; 4];
        let err = connection
            .read_stream(0, &mut [&mut buf[..]], Duration::ZERO, &mut StreamMetadata::default())
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_millis(150));

        control.join().unwrap().unwrap();
    }

    #[test]
    fn write_interleaves_channels() {
        let rig = rig();
        let a = [0xA0u8, 0xA1, 0xA2, 0xA3];
        let b = [0xB0u8, 0xB1, 0xB2, 0xB3];
        let written = rig.connection.write_stream(1, &[&a[..], &b[..]], SHORT, &StreamMetadata::default()).unwrap();

        assert_eq!(written, 4);
        let sent = rig.tx.sent();
        assert_eq!(sent[0].stream_id, 1);
        assert_eq!(sent[0].payload, vec![0xA0, 0xA1, 0xA2, 0xA3, 0xB0, 0xB1, 0xB2, 0xB3]);
        assert_eq!(sent[0].timestamp, None);
        assert_eq!(rig.connection.stream_state(StreamDirection::Tx, 1), Some(StreamState::Running));
    }

    #[test]
    fn empty_write_can_still_end_a_burst() {
        let rig = rig();
        let empty: &[u8] = &[];
        assert_eq!(rig.connection.write_stream(0, &[empty], SHORT, &StreamMetadata::default()).unwrap(), 0);
        assert!(rig.tx.sent().is_empty());

        let end = StreamMetadata::default().with_end_of_burst(true);
        assert_eq!(rig.connection.write_stream(0, &[empty], SHORT, &end).unwrap(), 0);
        let sent = rig.tx.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].end_of_burst);
        assert!(sent[0].payload.is_empty());
    }

    #[test]
    fn write_timeout_reports_partial_transfer() {
        let rig = rig();
        rig.tx.limit_tx(Some(1));
        let data = [0x5Au8; 96];

        let written = rig.connection.write_stream(0, &[&data[..]], SHORT, &StreamMetadata::default()).unwrap();
        assert_eq!(written, 48);

        let err = rig.connection.write_stream(0, &[&data[..]], SHORT, &StreamMetadata::default()).unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
    }

    #[test]
    fn broken_pipe_disconnects() {
        let rig = rig();
        rig.tx.break_pipe();

        let err = rig.connection.write_stream(0, &[&[0u8; 4][..]], SHORT, &StreamMetadata::default()).unwrap_err();
        assert!(matches!(err, ConnectionError::Disconnected));
        assert!(!rig.connection.is_open());
        assert_eq!(rig.connection.stream_state(StreamDirection::Tx, 0), Some(StreamState::Error));
    }

    #[test]
    fn streaming_without_pipes_is_unsupported() {
        let (connection, _device) = connect(Dialect::Lms64c);
        let mut buf = [0u8; 4];
        assert!(matches!(
            connection.read_stream(0, &mut [&mut buf[..]], SHORT, &mut StreamMetadata::default()),
            Err(ConnectionError::Unsupported { .. })
        ));
        assert!(matches!(
            connection.write_stream(0, &[&buf[..]], SHORT, &StreamMetadata::default()),
            Err(ConnectionError::Unsupported { .. })
        ));
    }
}
