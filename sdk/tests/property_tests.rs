use proptest::prelude::*;
use sdk::errors::{MemoryError, MemoryErrorExt};
use std::time::Duration;

// Every error variant yields a non-empty static hint that never echoes
// the underlying message back to the user.
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "[a-z/._]{8,40}", secs in 0..600u64) {
        let errs = vec![
            MemoryError::Config(error_str.clone()),
            MemoryError::Decode(error_str.clone()),
            MemoryError::Task(error_str.clone()),
            MemoryError::Io(std::io::Error::new(std::io::ErrorKind::Other, error_str.clone())),
            MemoryError::Timeout { operation: "save", budget: Duration::from_secs(secs) },
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&error_str));
        }
    }
}

proptest! {
    #[test]
    fn test_sentinel_detection_ignores_padding(pad_left in " {0,4}", pad_right in " {0,4}") {
        let padded_none = format!("{}none{}", pad_left, pad_right);
        let padded_legacy = format!("{}无{}", pad_left, pad_right);
        prop_assert!(sdk::is_none_sentinel(&padded_none));
        prop_assert!(sdk::is_none_sentinel(&padded_legacy));
    }
}
