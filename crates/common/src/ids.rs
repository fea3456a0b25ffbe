//! Typed identifiers for the fact and dimension keys.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(
            /// Raw key value as stored in the source table.
            pub String,
        );

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
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
    };
}

string_id!(
    /// Unique order key (fact table primary key).
    OrderId
);
string_id!(
    /// Customer dimension key.
    CustomerId
);
string_id!(
    /// Restaurant dimension key.
    RestaurantId
);
string_id!(
    /// Delivery partner dimension key.
    DeliveryPartnerId
);
