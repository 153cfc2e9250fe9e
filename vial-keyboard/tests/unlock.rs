mod common;

use std::time::Duration;

use common::{unlocked_keyboard, Firmware, Harness};
use vial_keyboard::{EntityKind, KeyboardError, UnlockState};
use vial_transport::protocol::{cmd, unlock_state};

fn scripted(states: &[u8]) -> Harness {
    let harness = Harness::new(Firmware::default());
    harness.firmware.lock().unlock_script = states.iter().copied().collect();
    harness
}

#[tokio::test(start_paused = true)]
async fn test_unlock_confirmed_after_polling() {
    let harness = scripted(&[
        unlock_state::PENDING,
        unlock_state::PENDING,
        unlock_state::CONFIRMED,
    ]);
    let keyboard = harness.connect().await;
    assert_eq!(keyboard.unlock_state(), UnlockState::Locked);

    keyboard.begin_unlock().await.unwrap();
    assert_eq!(keyboard.unlock_state(), UnlockState::Unlocked);
    assert_eq!(harness.sent_of(cmd::UNLOCK_BEGIN), 1);
    // One status read at connect, three while polling
    assert_eq!(harness.sent_of(cmd::UNLOCK_STATUS), 4);

    let before = harness.sent();
    keyboard.begin_unlock().await.unwrap();
    assert_eq!(harness.sent(), before);
}

#[tokio::test(start_paused = true)]
async fn test_unlock_rejected_returns_to_locked() {
    let harness = scripted(&[unlock_state::PENDING, unlock_state::REJECTED]);
    let keyboard = harness.connect().await;

    assert_eq!(
        keyboard.begin_unlock().await,
        Err(KeyboardError::UnlockRejected)
    );
    assert_eq!(keyboard.unlock_state(), UnlockState::Locked);
    assert_eq!(
        keyboard
            .entities()
            .write_slot(EntityKind::Macro, 0, &[1, 4, 0])
            .await,
        Err(KeyboardError::NotUnlocked)
    );
}

#[tokio::test(start_paused = true)]
async fn test_unlock_times_out() {
    let harness = scripted(&[]);
    let keyboard = harness.connect().await;

    assert_eq!(
        keyboard.begin_unlock().await,
        Err(KeyboardError::UnlockTimeout(2_000))
    );
    assert_eq!(keyboard.unlock_state(), UnlockState::Locked);
}

#[tokio::test(start_paused = true)]
async fn test_secure_ops_refused_while_unlocking() {
    let harness = scripted(&[unlock_state::PENDING]);
    let keyboard = harness.connect().await;

    let unlock = keyboard.begin_unlock();
    tokio::pin!(unlock);
    tokio::select! {
        _ = &mut unlock => panic!("unlock finished early"),
        _ = tokio::time::sleep(Duration::from_millis(20)) => {}
    }
    assert_eq!(keyboard.unlock_state(), UnlockState::Unlocking);

    let before = harness.sent();
    assert_eq!(keyboard.keymap().reset().await, Err(KeyboardError::NotUnlocked));
    assert_eq!(keyboard.reboot_to_bootloader().await, Err(KeyboardError::NotUnlocked));
    assert_eq!(keyboard.begin_unlock().await, Err(KeyboardError::UnlockInProgress));
    assert_eq!(keyboard.lock().await, Err(KeyboardError::UnlockInProgress));
    assert_eq!(harness.sent(), before);

    harness.firmware.lock().unlock_script = [unlock_state::CONFIRMED].into();
    unlock.await.unwrap();
    assert_eq!(keyboard.unlock_state(), UnlockState::Unlocked);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_unlock_reverts() {
    let harness = scripted(&[unlock_state::PENDING]);
    let keyboard = harness.connect().await;

    let cancelled = tokio::time::timeout(Duration::from_millis(50), keyboard.begin_unlock()).await;
    assert!(cancelled.is_err());
    assert_eq!(keyboard.unlock_state(), UnlockState::Locked);

    harness.firmware.lock().unlock_script = [unlock_state::CONFIRMED].into();
    keyboard.begin_unlock().await.unwrap();
    assert_eq!(keyboard.unlock_state(), UnlockState::Unlocked);
}

#[tokio::test(start_paused = true)]
async fn test_lock_relocks_device() {
    let harness = Harness::new(Firmware::default());
    let keyboard = unlocked_keyboard(&harness).await;
    assert!(harness.firmware.lock().unlocked);

    keyboard.lock().await.unwrap();
    assert_eq!(keyboard.unlock_state(), UnlockState::Locked);
    assert!(!harness.firmware.lock().unlocked);
    assert_eq!(keyboard.keymap().reset().await, Err(KeyboardError::NotUnlocked));
}

#[tokio::test]
async fn test_handshake_reports_pending_unlock() {
    let harness = scripted(&[unlock_state::PENDING]);
    harness.firmware.lock().unlock_pending = true;
    let keyboard = harness.connect().await;

    assert!(keyboard.info().unlock_in_progress);
    assert_eq!(keyboard.unlock_state(), UnlockState::Locked);
}

#[tokio::test(start_paused = true)]
async fn test_bootloader_jump_without_answer_succeeds() {
    let harness = Harness::new(Firmware::default());
    let keyboard = unlocked_keyboard(&harness).await;
    harness
        .firmware
        .lock()
        .silent_commands
        .push(cmd::BOOTLOADER_JUMP);

    keyboard.reboot_to_bootloader().await.unwrap();
    assert!(!keyboard.is_connected());
    assert_eq!(harness.sent_of(cmd::BOOTLOADER_JUMP), 1);
}
