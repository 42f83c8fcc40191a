//! Order lifecycle and user role enums.
//!
//! [`OrderStatus`] carries the whole transition policy for orders. The
//! services layer decides *who* may request a transition; this type decides
//! *whether* the transition is legal at all.

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// Expected progression is `InProgress → Confirmed → Assembled → Sent →
/// Delivered`. Managers may skip ahead (e.g. `InProgress → Assembled`) but
/// never move backward. `Canceled` is reachable from `InProgress`,
/// `Confirmed` and `Assembled` only - once an order is `Sent` it rides to the
/// end. `Delivered` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    InProgress,
    Confirmed,
    Assembled,
    Sent,
    Delivered,
    Canceled,
}

impl OrderStatus {
    /// Position in the forward progression. `Canceled` sits outside the
    /// progression and has no rank.
    const fn rank(self) -> Option<u8> {
        match self {
            Self::InProgress => Some(0),
            Self::Confirmed => Some(1),
            Self::Assembled => Some(2),
            Self::Sent => Some(3),
            Self::Delivered => Some(4),
            Self::Canceled => None,
        }
    }

    /// Whether this status is terminal (no transitions out).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }

    /// Whether the order may still be canceled from this status.
    ///
    /// Orders that have been handed to the carrier (`Sent`) or completed
    /// cannot be canceled.
    #[must_use]
    pub const fn is_cancelable(self) -> bool {
        matches!(self, Self::InProgress | Self::Confirmed | Self::Assembled)
    }

    /// Validate a transition from `self` to `next`.
    ///
    /// Legal transitions are strictly forward progression (any later status,
    /// skipping allowed) and cancellation from a cancelable status. Anything
    /// out of a terminal status, backward, or self-to-self is rejected.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Canceled {
            return self.is_cancelable();
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Confirmed => "CONFIRMED",
            Self::Assembled => "ASSEMBLED",
            Self::Sent => "SENT",
            Self::Delivered => "DELIVERED",
            Self::Canceled => "CANCELED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(Self::InProgress),
            "CONFIRMED" => Ok(Self::Confirmed),
            "ASSEMBLED" => Ok(Self::Assembled),
            "SENT" => Ok(Self::Sent),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELED" => Ok(Self::Canceled),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Role a user registered with.
///
/// `Shop` users own at most one shop and list products; `Manager` users
/// service orders. At least one manager must exist for checkout to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    Buyer,
    Shop,
    Manager,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Buyer => "BUYER",
            Self::Shop => "SHOP",
            Self::Manager => "MANAGER",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUYER" => Ok(Self::Buyer),
            "SHOP" => Ok(Self::Shop),
            "MANAGER" => Ok(Self::Manager),
            _ => Err(format!("invalid user role: {s}")),
        }
    }
}

// SQLx support (with postgres feature): stored as TEXT
#[cfg(feature = "postgres")]
macro_rules! text_enum_sqlx {
    ($name:ident) => {
        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                s.parse().map_err(Into::into)
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.to_string(), buf)
            }
        }
    };
}

#[cfg(feature = "postgres")]
text_enum_sqlx!(OrderStatus);
#[cfg(feature = "postgres")]
text_enum_sqlx!(UserRole);
