use std::{sync::Arc, time::Duration};

use observatory_control::{
    command_channel::MountConnection,
    dome_geometry::{DomeGeometry, DomeGeometryConfig},
    dome_model::{DomeConfig, DomeController, SyncOutcome},
    error::ObservatoryError,
    mock_controller::{mock_mount::MockMount, mount_state::MountState},
    mount_model::MountDriver,
    mount_status::{
        AccessPoint, ConnectionType, Direction, ElementTemperature, PierSide, Security,
        SlewResult, WirelessScan,
    },
    pointing::PointingSource,
};

async fn connected_driver() -> (MockMount, MountDriver) {
    let mock_mount = MockMount::start("127.0.0.1", 0, MountState::default())
        .await
        .unwrap();
    let driver = MountDriver::new(MountConnection::new(
        "127.0.0.1",
        mock_mount.port(),
        Duration::from_secs(2),
    ));
    driver.connect().await.unwrap();
    (mock_mount, driver)
}

#[tokio::test]
async fn test_not_connected() {
    let driver = MountDriver::new(MountConnection::new(
        "127.0.0.1",
        1,
        Duration::from_millis(200),
    ));

    assert!(matches!(
        driver.get_status().await,
        Err(ObservatoryError::NotConnected)
    ));
    assert!(!driver.is_connected().await);
}

#[tokio::test]
async fn test_identity_and_initial_state() {
    let (_mock_mount, driver) = connected_driver().await;

    assert!(driver.is_connected().await);
    assert_eq!(driver.get_status().await.unwrap(), "Parked");
    assert!(!driver.is_ready().await.unwrap());
    assert!(!driver.is_tracking().await.unwrap());
    assert_eq!(driver.pier_side().await.unwrap(), PierSide::West);
    assert_eq!(driver.firmware_number().await.unwrap(), "3.0.0");
    assert!(driver.product_name().await.unwrap().contains("mock"));
    assert_eq!(
        driver.get_connection_type().await.unwrap(),
        ConnectionType::CabledLan
    );

    let (ra, dec) = driver.get_mount_ra_dec_decimal().await.unwrap();
    assert!((ra - (14.0 + 39.0 / 60.0 + 36.5 / 3600.0)).abs() < 1e-3);
    assert!((dec + (60.0 + 50.0 / 60.0 + 2.0 / 3600.0)).abs() < 1e-3);

    let (alt, az) = driver.get_mount_alt_az_decimal().await.unwrap();
    assert!((-90.0..=90.0).contains(&alt));
    assert!((0.0..360.0).contains(&az));
}

#[tokio::test]
async fn test_slew_lifecycle() {
    let (_mock_mount, driver) = connected_driver().await;

    let ack = driver.set_target_ra_dec(10.5, -20.0).await.unwrap();
    assert!(ack.accepted());
    let (ra, dec) = driver.get_target_ra_dec_decimal().await.unwrap();
    assert!((ra - 10.5).abs() < 1e-6);
    assert!((dec + 20.0).abs() < 1e-6);

    assert_eq!(
        driver.slew_to_target_equatorial(None).await.unwrap(),
        SlewResult::Rejected("Mount is Parked".to_owned())
    );

    driver.unpark().await.unwrap();
    assert_eq!(driver.get_status().await.unwrap(), "Idle (Tracking Off)");
    assert!(driver.is_ready().await.unwrap());

    assert_eq!(
        driver.slew_to_target_equatorial(None).await.unwrap(),
        SlewResult::Started
    );
    assert_eq!(driver.get_status().await.unwrap(), "Slewing");
    // A meridian flip is refused mid slew.
    assert!(!driver.flip().await.unwrap());

    driver.stop_all_movement().await.unwrap();
    assert_eq!(driver.get_status().await.unwrap(), "Idle (Tracking Off)");

    driver.start_tracking().await.unwrap();
    assert!(driver.is_tracking().await.unwrap());
    assert_eq!(driver.get_status().await.unwrap(), "Tracking");

    driver.park().await.unwrap();
    assert_eq!(driver.get_status().await.unwrap(), "Parked");
}

#[tokio::test]
async fn test_pier_side_slew_and_flip() {
    let (_mock_mount, driver) = connected_driver().await;
    driver.unpark().await.unwrap();
    driver.set_target_ra_dec(14.5, -61.0).await.unwrap();

    assert_eq!(
        driver
            .slew_to_target_equatorial(Some(PierSide::East))
            .await
            .unwrap(),
        SlewResult::Requested
    );
    assert_eq!(driver.pier_side().await.unwrap(), PierSide::East);

    driver.halt_movement(None).await.unwrap();
    assert!(driver.flip().await.unwrap());
    assert_eq!(driver.pier_side().await.unwrap(), PierSide::West);
}

#[tokio::test]
async fn test_slew_without_target() {
    let (_mock_mount, driver) = connected_driver().await;
    driver.unpark().await.unwrap();

    assert_eq!(
        driver.slew_to_target_equatorial(None).await.unwrap(),
        SlewResult::Rejected("No Object Set".to_owned())
    );
}

#[tokio::test]
async fn test_validation_happens_before_io() {
    let (_mock_mount, driver) = connected_driver().await;

    assert!(matches!(
        driver.set_high_alt_limit(91).await,
        Err(ObservatoryError::Validation(_))
    ));
    assert!(matches!(
        driver.set_high_alt_limit(-1).await,
        Err(ObservatoryError::Validation(_))
    ));
    assert!(matches!(
        driver.adjust_mount_time(1000).await,
        Err(ObservatoryError::Validation(_))
    ));
    assert!(matches!(
        driver.nudge(Direction::North, 0).await,
        Err(ObservatoryError::Validation(_))
    ));

    // The connection is still in step after the refused calls.
    assert!(driver.set_high_alt_limit(85).await.unwrap());
    assert_eq!(driver.get_upper_limit().await.unwrap(), "+85");
    assert!(driver.adjust_mount_time(-250).await.unwrap());
}

#[tokio::test]
async fn test_nudge() {
    let (_mock_mount, driver) = connected_driver().await;

    driver.nudge(Direction::East, 20).await.unwrap();
    assert_eq!(driver.get_status().await.unwrap(), "Parked");
}

#[tokio::test]
async fn test_element_temperature() {
    let (_mock_mount, driver) = connected_driver().await;

    assert_eq!(
        driver.get_element_temperature(1).await.unwrap(),
        ElementTemperature::Celsius(20.5)
    );
    assert_eq!(
        driver.get_element_temperature(12).await.unwrap(),
        ElementTemperature::Unavailable
    );
}

#[tokio::test]
async fn test_time_queries() {
    let (_mock_mount, driver) = connected_driver().await;

    let (date, time) = driver.get_utc_date_time().await.unwrap();
    assert_eq!(date.len(), 10);
    assert_eq!(time.split(':').count(), 3);

    let sidereal = driver.get_sidereal_hours().await.unwrap();
    assert!((0.0..24.0).contains(&sidereal));

    assert!(driver
        .set_utc_date_time("2024-05-01", "12:30:00.00")
        .await
        .unwrap());
    let (date, _) = driver.get_utc_date_time().await.unwrap();
    assert_eq!(date, "2024-05-01");
}

#[tokio::test]
async fn test_network_queries() {
    let (_mock_mount, driver) = connected_driver().await;

    let wired = driver.get_ip_info(false).await.unwrap();
    assert_eq!(wired.ip, "127.0.0.1");
    assert!(wired.dhcp);
    let wireless = driver.get_ip_info(true).await.unwrap();
    assert!(!wireless.dhcp);

    assert_eq!(
        driver.wireless_access_points().await.unwrap(),
        WirelessScan::Complete(Vec::new())
    );
    assert!(driver.scan_wireless().await.unwrap());
    assert_eq!(
        driver.wireless_access_points().await.unwrap(),
        WirelessScan::InProgress
    );
    assert_eq!(
        driver.wireless_access_points().await.unwrap(),
        WirelessScan::Complete(vec![
            AccessPoint {
                ssid: "MockNet".to_owned(),
                security: Security::Wpa2,
            },
            AccessPoint {
                ssid: "Guest".to_owned(),
                security: Security::Open,
            },
        ])
    );
}

#[tokio::test]
async fn test_event_and_communication_logs() {
    let (_mock_mount, driver) = connected_driver().await;

    driver.start_log().await.unwrap();
    driver.unpark().await.unwrap();
    driver.stop_log().await.unwrap();

    assert_eq!(driver.get_event_log().await.unwrap(), "Unparked");
    let communication_log = driver.get_communication_log().await.unwrap();
    assert!(communication_log.contains(":PO"));
    assert!(communication_log.contains(":stoplog"));
}

#[tokio::test]
async fn test_close_and_reconnect() {
    let (_mock_mount, driver) = connected_driver().await;
    driver.unpark().await.unwrap();

    driver.close().await;
    assert!(matches!(
        driver.get_status().await,
        Err(ObservatoryError::NotConnected)
    ));

    driver.connect().await.unwrap();
    assert_eq!(driver.get_status().await.unwrap(), "Idle (Tracking Off)");
}

#[tokio::test]
async fn test_dome_follows_mock_mount() {
    let (_mock_mount, driver) = connected_driver().await;
    let driver = Arc::new(driver);

    let pointing = driver.read_pointing().await.unwrap();
    assert_eq!(pointing.pier_side, PierSide::West);

    let geometry = DomeGeometry::new(DomeGeometryConfig::default());
    let expected = geometry.calculate_dome_azimuth(
        pointing.ra_hours,
        pointing.dec_degrees,
        pointing.sidereal_hours,
        pointing.pier_side,
    );

    let dome = DomeController::new(DomeConfig::default(), geometry, driver.clone()).unwrap();
    match dome.run_sync_cycle().await.unwrap() {
        SyncOutcome::Moved { required_azimuth }
        | SyncOutcome::WithinHysteresis {
            required_azimuth, ..
        } => {
            // Sidereal time moves between the two reads.
            let delta = (required_azimuth - expected).abs();
            assert!(delta < 1.0 || delta > 359.0, "{required_azimuth} vs {expected}");
        }
        SyncOutcome::DomeMoving => panic!("dome should be at rest"),
    }

    dome.close().await;
    driver.close().await;
}
