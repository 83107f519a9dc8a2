use std::sync::atomic::{AtomicBool, Ordering};

use vpw_pcm::{
    ResponseStatus, Vehicle,
    hardware::{
        Device, DeviceConfig,
        mock::{DEFAULT_OSID, MockDevice, MockPcm, default_image},
    },
    logging::{Conversion, LogColumn, Logger, LoggerConfigurationFactory, Parameter, StorageType},
    pcm_info::PcmInfo,
    vehicle::WriteType,
    vpw::VpwSpeed,
};

/// Placeholder kernel, the mock only stores it
const KERNEL: [u8; 8] = [0x4E, 0x71, 0x4E, 0x71, 0x4E, 0x71, 0x4E, 0x75];

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn connect(pcm: MockPcm, enable_4x: bool) -> Vehicle<MockDevice> {
    init_logging();
    let mut vehicle = Vehicle::new(MockDevice::new(pcm, DeviceConfig { enable_4x }));
    assert!(vehicle.initialize());
    vehicle
}

#[test]
fn identify_pcm() {
    let mut vehicle = connect(MockPcm::new(), false);
    assert_eq!(vehicle.query_vin().into_value(), "1GCEC14X5RZ123456");
    assert_eq!(vehicle.query_serial().into_value(), "123423453456");
    assert_eq!(vehicle.query_bcc().into_value(), "4321");
    assert_eq!(vehicle.query_operating_system_id().into_value(), DEFAULT_OSID);
    assert_eq!(vehicle.query_calibration_id().into_value(), 12345);
    assert_eq!(vehicle.query_hardware_id().into_value(), 23456);

    let info = PcmInfo::new(vehicle.query_operating_system_id().into_value());
    assert_eq!(info.image_size, 512 * 1024);
}

#[test]
fn vin_change_needs_unlock() {
    let mut vehicle = connect(MockPcm::new(), false);
    let new_vin = "1G1YY22G965104378";

    let refused = vehicle.update_vin(new_vin).unwrap();
    assert_eq!(refused.status(), ResponseStatus::Refused);
    assert_eq!(vehicle.device().pcm().vin(), "1GCEC14X5RZ123456");

    let info = PcmInfo::new(DEFAULT_OSID);
    assert!(vehicle.unlock_ecu(&info.key()).is_success());
    assert!(vehicle.update_vin(new_vin).unwrap().is_success());
    assert_eq!(vehicle.query_vin().into_value(), new_vin);

    // Rejected before anything is sent
    let sent = vehicle.device().sent().len();
    assert!(vehicle.update_vin("TOO SHORT").is_err());
    assert_eq!(vehicle.device().sent().len(), sent);
}

#[test]
fn read_modify_write_compare() {
    let mut vehicle = connect(MockPcm::new(), true);
    let info = PcmInfo::new(DEFAULT_OSID);
    assert!(vehicle.unlock_ecu(&info.key()).is_success());

    let read = vehicle.read_contents(&info, &KERNEL);
    assert!(read.is_success());
    let mut image = read.into_value();
    assert_eq!(image, default_image(info.image_size as usize));
    assert_eq!(vehicle.device().speed(), VpwSpeed::Standard);

    image[0x8100..0x8200].fill(0x5A);
    let written = vehicle
        .write_contents(&info, &KERNEL, &image, WriteType::Calibration)
        .unwrap();
    assert!(written.is_success());
    assert_eq!(vehicle.device().pcm().flash(), image.as_slice());

    let compared = vehicle
        .write_contents(&info, &KERNEL, &image, WriteType::Compare)
        .unwrap();
    assert!(compared.is_success());
    assert!(*compared.value());
    assert!(!vehicle.device().pcm().is_kernel_running());
}

#[test]
fn read_stays_at_1x_when_modules_refuse() {
    let mut pcm = MockPcm::new();
    pcm.set_refuse_high_speed(true);
    pcm.set_unlocked(true);
    let mut vehicle = connect(pcm, true);
    let info = PcmInfo::new(DEFAULT_OSID);

    let read = vehicle.read_contents(&info, &KERNEL);
    assert_eq!(read.status(), ResponseStatus::Error);
    assert_eq!(vehicle.device().speed(), VpwSpeed::Standard);
    assert!(!vehicle.device().pcm().is_kernel_running());
}

#[test]
fn logging_session() {
    let mut pcm = MockPcm::new();
    pcm.set_pid(0x000C, 3200);
    pcm.set_pid(0x0005, 130);
    pcm.set_ram(0xFF8A84, 3);
    let mut vehicle = connect(pcm, false);
    let osid = vehicle.query_operating_system_id().into_value();

    let columns = vec![
        LogColumn::new(
            Parameter::pid("rpm", "Engine Speed", 0x000C, StorageType::UInt16),
            Conversion::new("RPM", "x*.25", "0").unwrap(),
        ),
        LogColumn::new(
            Parameter::pid("ect", "Coolant Temperature", 0x0005, StorageType::UInt8),
            Conversion::new("C", "x-40", "0").unwrap(),
        ),
        LogColumn::new(
            Parameter::ram("knock", "Knock Retard", StorageType::UInt8, &[(osid, 0xFF8A84)]),
            Conversion::new("deg", "x", "0").unwrap(),
        ),
    ];
    let configuration = LoggerConfigurationFactory::new(columns, osid).create(false);
    let mut logger = Logger::new(configuration);
    assert_eq!(logger.column_headers().len(), 3);
    assert!(logger.start_logging(&mut vehicle, osid).unwrap());

    let stop = AtomicBool::new(false);
    let mut rows = Vec::new();
    logger
        .run(&mut vehicle, &stop, |row| {
            rows.push(row);
            stop.store(rows.len() == 2, Ordering::Relaxed);
        })
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], vec!["800", "90", "3"]);
}
