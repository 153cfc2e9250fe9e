mod common;

use common::{Firmware, Harness};
use vial_keyboard::settings::SETTINGS;
use vial_keyboard::{KeyboardError, SettingValue};
use vial_transport::protocol::{cmd, status};
use vial_transport::TransportError;

const TAPPING_TERM: u16 = 7;
const SWAP_CTL_GUI: u16 = 21;

#[tokio::test]
async fn test_get_always_reads_firmware() {
    let harness = Harness::new(Firmware::default());
    let keyboard = harness.connect().await;

    let settings = keyboard.settings();
    assert_eq!(settings.get(TAPPING_TERM).await.unwrap(), SettingValue::U16(200));
    harness
        .firmware
        .lock()
        .settings
        .insert(TAPPING_TERM, 180u16.to_le_bytes().to_vec());
    assert_eq!(settings.get(TAPPING_TERM).await.unwrap(), SettingValue::U16(180));
    assert_eq!(harness.sent_of(cmd::SETTING_GET), 2);
    assert_eq!(settings.cached(TAPPING_TERM), Some(SettingValue::U16(180)));
}

#[tokio::test]
async fn test_set_updates_cache_after_ack() {
    let harness = Harness::new(Firmware::default());
    let keyboard = harness.connect().await;

    keyboard
        .settings()
        .set(SWAP_CTL_GUI, SettingValue::Bool(true))
        .await
        .unwrap();
    assert_eq!(harness.firmware.lock().settings[&SWAP_CTL_GUI], vec![1]);
    assert_eq!(
        keyboard.settings().cached(SWAP_CTL_GUI),
        Some(SettingValue::Bool(true))
    );
}

#[tokio::test]
async fn test_rejected_set_keeps_cached_value() {
    let harness = Harness::new(Firmware::default());
    let keyboard = harness.connect().await;
    let settings = keyboard.settings();
    settings.get(TAPPING_TERM).await.unwrap();

    let err = settings
        .set(TAPPING_TERM, SettingValue::U16(5000))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        KeyboardError::Transport(TransportError::RejectedByFirmware {
            command: cmd::SETTING_SET,
            status: status::REJECTED,
        })
    );
    assert_eq!(settings.cached(TAPPING_TERM), Some(SettingValue::U16(200)));
    assert_eq!(
        harness.firmware.lock().settings[&TAPPING_TERM],
        200u16.to_le_bytes().to_vec()
    );
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_set_forgets_cached_value() {
    let harness = Harness::new(Firmware::default());
    let keyboard = harness.connect().await;
    let settings = keyboard.settings();
    settings.get(TAPPING_TERM).await.unwrap();

    harness.firmware.lock().silent_commands.push(cmd::SETTING_SET);
    let err = settings
        .set(TAPPING_TERM, SettingValue::U16(250))
        .await
        .unwrap_err();
    assert_eq!(err, KeyboardError::Transport(TransportError::Timeout));
    assert_eq!(settings.cached(TAPPING_TERM), None);
}

#[tokio::test]
async fn test_wrong_type_and_unknown_id_send_nothing() {
    let harness = Harness::new(Firmware::default());
    let keyboard = harness.connect().await;
    let before = harness.sent();

    assert!(matches!(
        keyboard.settings().set(TAPPING_TERM, SettingValue::Bool(true)).await,
        Err(KeyboardError::InvalidValue(_))
    ));
    assert!(matches!(
        keyboard.settings().get(999).await,
        Err(KeyboardError::InvalidValue(_))
    ));
    assert_eq!(harness.sent(), before);
}

#[tokio::test]
async fn test_supported_pages_through_ids() {
    let mut firmware = Firmware::default();
    for def in SETTINGS {
        firmware.settings.entry(def.id).or_insert_with(|| vec![0; 4]);
    }
    firmware.settings.insert(300, vec![0]);
    let harness = Harness::new(firmware);
    let keyboard = harness.connect().await;

    let supported = keyboard.settings().supported().await.unwrap();
    let ids: Vec<u16> = supported.iter().map(|def| def.id).collect();
    let expected: Vec<u16> = SETTINGS.iter().map(|def| def.id).collect();
    assert_eq!(ids, expected);
    assert_eq!(harness.sent_of(cmd::SETTINGS_QUERY), 2);
}

#[tokio::test]
async fn test_reset_clears_cache() {
    let harness = Harness::new(Firmware::default());
    let keyboard = harness.connect().await;
    let settings = keyboard.settings();
    settings.set(TAPPING_TERM, SettingValue::U16(300)).await.unwrap();

    settings.reset().await.unwrap();
    assert_eq!(settings.cached(TAPPING_TERM), None);
    assert_eq!(settings.get(TAPPING_TERM).await.unwrap(), SettingValue::U16(200));
}
