use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fresh random identifier (UUID v4).
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

document_id!(
    /// Key of a `users/{uid}` document, issued by the identity provider.
    UserId
);
document_id!(
    /// Store-assigned key of a `schedules/{id}` document.
    ScheduleId
);
document_id!(
    /// Store-assigned key of a `bookings/{id}` document.
    BookingId
);
document_id!(
    /// Client-generated slot token. Slots are embedded in a schedule and never
    /// addressed by the store on their own, so the client mints the key.
    SlotId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = UserId::new("tutor-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"tutor-1\"");

        let back: UserId = serde_json::from_str("\"tutor-1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_generated_slot_ids_are_unique() {
        assert_ne!(SlotId::generate(), SlotId::generate());
    }
}
