//! Integration tests for the PWM text protocol and naming rules
//!
//! Covers the write validation rules, the read text format and the class/node
//! naming limits as seen from outside the crate.

use protocol::naming::{MAX_CLASS_NAME_LEN, MAX_NODE_NAME_LEN};
use protocol::{
    AttachError, Direction, EndpointDescriptor, InterfaceDescriptor, ProtocolError, PwmValue,
    SlotId, TransferKind, class_name, node_name, parse_write,
};
use proptest::prelude::*;

mod write_validation {
    use super::*;

    #[test]
    fn test_malformed_inputs() {
        let cases: &[&[u8]] = &[b"abc", b"12a", b" 12", b"1\n\n", b"\n1", b"+1", b"-1"];
        for input in cases {
            assert!(
                parse_write(input).is_err(),
                "{:?} should be malformed",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_length_limits() {
        assert!(parse_write(b"12345678").is_ok());
        assert!(parse_write(b"12345678\n").is_ok());
        assert_eq!(
            parse_write(b"123456789"),
            Err(ProtocolError::TooManyDigits { digits: 9, max: 8 })
        );
        assert_eq!(
            parse_write(b"123456789\n"),
            Err(ProtocolError::PayloadTooLong { len: 10, max: 9 })
        );
    }

    #[test]
    fn test_newline_is_equivalent_to_bare_digits() {
        let with_newline = parse_write(b"7\n").unwrap();
        let bare = parse_write(b"7").unwrap();
        assert_eq!(with_newline, bare);
    }

    #[test]
    fn test_zero() {
        let accepted = parse_write(b"0").unwrap();
        assert_eq!(accepted.value, PwmValue(0));
        assert_eq!(accepted.value.read_text(), "0\n");
    }

    proptest! {
        #[test]
        fn prop_canonical_digits_read_back(value in 0i32..100_000_000) {
            let text = value.to_string();
            let accepted = parse_write(text.as_bytes()).unwrap();
            prop_assert_eq!(accepted.digits, text.as_bytes());
            prop_assert_eq!(accepted.value.read_text(), format!("{}\n", text));
        }

        #[test]
        fn prop_non_digit_byte_rejected(
            prefix in "[0-9]{0,3}",
            bad in any::<u8>().prop_filter("non-digit", |b| !b.is_ascii_digit() && *b != b'\n'),
            suffix in "[0-9]{0,3}",
        ) {
            let mut input = prefix.into_bytes();
            input.push(bad);
            input.extend_from_slice(suffix.as_bytes());
            let is_invalid_byte = matches!(
                parse_write(&input),
                Err(ProtocolError::InvalidByte { .. })
            );
            prop_assert!(is_invalid_byte);
        }
    }
}

mod naming {
    use super::*;

    #[test]
    fn test_every_slot_has_a_valid_class_name() {
        for slot in 0..64u8 {
            let name = class_name(SlotId(slot)).unwrap();
            assert!(name.len() <= MAX_CLASS_NAME_LEN);
            assert!(name.starts_with("hp-gadget"));
        }
    }

    #[test]
    fn test_node_names_are_unique_per_index() {
        let class = class_name(SlotId(12)).unwrap();
        let names: Vec<String> = (0..30u8).map(|i| node_name(&class, i).unwrap()).collect();
        for (i, name) in names.iter().enumerate() {
            assert!(name.len() <= MAX_NODE_NAME_LEN);
            assert_eq!(name, &format!("hp-gadget12pwm{}", i));
        }
    }
}

mod descriptors {
    use super::*;

    #[test]
    fn test_interface_endpoint_order_is_kept() {
        let iface = InterfaceDescriptor::new(
            0,
            vec![
                EndpointDescriptor::bulk_out(1),
                EndpointDescriptor::bulk_in(2),
                EndpointDescriptor::interrupt_out(3),
            ],
        );
        assert_eq!(iface.num_endpoints(), 3);
        assert_eq!(iface.endpoints[0].direction(), Direction::Out);
        assert_eq!(iface.endpoints[1].direction(), Direction::In);
        assert_eq!(iface.endpoints[2].transfer_kind(), TransferKind::Interrupt);
    }

    #[test]
    fn test_attach_error_display() {
        let err = AttachError::Exhausted { capacity: 64 };
        assert_eq!(err.to_string(), "Can't handle more than 64 devices");
    }
}
