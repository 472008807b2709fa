//! Shared value types: amounts, addresses and caller identity

use crate::error::{ChannelError, ChannelResult};

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

/// Longest id, address or asset identifier accepted into a ledger key
pub const MAX_IDENT_LEN: usize = 128;

/// Non-negative arbitrary-precision token amount, serialized as a decimal string
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigUint);

impl Amount {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn is_zero(&self) -> bool {
        self.0.bits() == 0
    }

    /// Subtract, or `None` when `other` exceeds `self`
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if other.0 > self.0 {
            None
        } else {
            Some(Amount(&self.0 - &other.0))
        }
    }
}

impl Add<&Amount> for &Amount {
    type Output = Amount;

    fn add(self, rhs: &Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl FromStr for Amount {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ChannelError::MalformedAmount(s.to_string()));
        }
        BigUint::from_str(s)
            .map(Amount)
            .map_err(|_| ChannelError::MalformedAmount(s.to_string()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Account address as supplied by the identity layer
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(s: &str) -> ChannelResult<Self> {
        if !is_valid_ident(s) {
            return Err(ChannelError::InvalidAddress(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = ChannelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if !is_valid_ident(&s) {
            return Err(ChannelError::InvalidAddress(s));
        }
        Ok(Self(s))
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role granted to the caller by the identity layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
    Relay,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
            Role::Relay => "relay",
        }
    }
}

/// Validated caller of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub address: Address,
    pub role: Role,
}

impl Caller {
    pub fn new(address: Address, role: Role) -> Self {
        Self { address, role }
    }
}

/// Identifier usable as a ledger key part: non-empty, bounded, printable
pub fn is_valid_ident(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_IDENT_LEN && !s.chars().any(|c| c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_parse() {
        assert_eq!("450".parse::<Amount>().unwrap(), Amount::from(450));
        assert!("".parse::<Amount>().is_err());
        assert!("-1".parse::<Amount>().is_err());
        assert!("1.5".parse::<Amount>().is_err());
        assert!("+7".parse::<Amount>().is_err());

        let big: Amount = "340282366920938463463374607431768211456".parse().unwrap();
        assert_eq!(big.to_string(), "340282366920938463463374607431768211456");
    }

    #[test]
    fn test_amount_arithmetic() {
        let a = Amount::from(1000);
        let b = Amount::from(450);
        assert_eq!(a.checked_sub(&b), Some(Amount::from(550)));
        assert_eq!(b.checked_sub(&a), None);
        assert_eq!(&b + &Amount::from(550), a);
        assert!(Amount::zero().is_zero());
    }

    #[test]
    fn test_amount_serde_as_string() {
        let json = serde_json::to_string(&Amount::from(42)).unwrap();
        assert_eq!(json, "\"42\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Amount::from(42));
        assert!(serde_json::from_str::<Amount>("\"abc\"").is_err());
    }

    #[test]
    fn test_address_validation() {
        assert!(Address::parse("2datxk5TmB1spSNn9enVo11dcpgmUoSBSqCw5cCFkbwmXMFr").is_ok());
        assert!(Address::parse("").is_err());
        assert!(Address::parse("bad\u{0}addr").is_err());
        assert!(serde_json::from_str::<Address>("\"\"").is_err());
    }
}
