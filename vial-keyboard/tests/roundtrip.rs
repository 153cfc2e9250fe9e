use proptest::prelude::*;

use vial_keyboard::{Combo, EntityCodec, KeyOverride, Keycode, Macro, MacroAction, TapDance};

fn keycode() -> impl Strategy<Value = Keycode> {
    any::<u16>().prop_map(Keycode)
}

fn letter() -> impl Strategy<Value = Keycode> {
    (0x04u16..=0x1D).prop_map(Keycode)
}

fn action(key: BoxedStrategy<Keycode>) -> impl Strategy<Value = MacroAction> {
    prop_oneof![
        key.clone().prop_map(MacroAction::Tap),
        key.clone().prop_map(MacroAction::Down),
        key.prop_map(MacroAction::Up),
        any::<u16>().prop_map(MacroAction::Delay),
        "[a-z ,.!]{0,20}".prop_map(MacroAction::Text),
    ]
}

proptest! {
    #[test]
    fn macro_bytes_round_trip(actions in prop::collection::vec(action(keycode().boxed()), 0..12)) {
        let value = Macro::new(actions);
        let bytes = value.encode().unwrap();
        prop_assert_eq!(Macro::decode(&bytes).unwrap(), value);
    }

    #[test]
    fn macro_text_round_trip(actions in prop::collection::vec(action(letter().boxed()), 0..8)) {
        let value = Macro::new(actions);
        prop_assert_eq!(value.to_string().parse::<Macro>().unwrap(), value);
    }

    #[test]
    fn combo_round_trip(keys in prop::array::uniform4(keycode()), output in keycode()) {
        let value = Combo { keys, output };
        let bytes = value.encode().unwrap();
        prop_assert_eq!(bytes.len(), 10);
        prop_assert_eq!(Combo::decode(&bytes).unwrap(), value);
    }

    #[test]
    fn tap_dance_round_trip(
        keys in prop::array::uniform4(keycode()),
        tapping_term in any::<u16>(),
    ) {
        let value = TapDance {
            on_tap: keys[0],
            on_hold: keys[1],
            on_double_tap: keys[2],
            on_tap_hold: keys[3],
            tapping_term,
        };
        prop_assert_eq!(TapDance::decode(&value.encode().unwrap()).unwrap(), value);
    }

    #[test]
    fn key_override_round_trip(
        trigger in keycode(),
        replacement in keycode(),
        layers in any::<u16>(),
        mods in prop::array::uniform4(any::<u8>()),
    ) {
        let value = KeyOverride {
            trigger,
            replacement,
            layers,
            trigger_mods: mods[0],
            negative_mod_mask: mods[1],
            suppressed_mods: mods[2],
            options: mods[3],
        };
        prop_assert_eq!(KeyOverride::decode(&value.encode().unwrap()).unwrap(), value);
    }

    #[test]
    fn decoders_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = Macro::decode(&bytes);
        let _ = Combo::decode(&bytes);
        let _ = TapDance::decode(&bytes);
        let _ = KeyOverride::decode(&bytes);
    }
}
