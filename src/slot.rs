//! Slot identifiers and allocation policies.
//!
//! A slot ties a root image (`image_<slot>.squashfs`) to the boot
//! executables built for it. The slot is carried in the embedded cmdline as
//! `secure_squash_root_slot=<slot>`.

use anyhow::{bail, Result};
use rand::rngs::OsRng;
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// Alphabet for random slot tokens.
const SLOT_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a random slot token.
pub const RANDOM_SLOT_LEN: usize = 8;

/// Tokens used by [`SlotPolicy::Alternate`].
pub const ALTERNATE_SLOTS: [&str; 2] = ["a", "b"];

/// A validated slot token: non-empty, ASCII lowercase letters and digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(String);

impl Slot {
    /// Validate and wrap a slot token.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            bail!("Slot must not be empty");
        }
        if !token
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            bail!("Slot '{}' contains characters outside [a-z0-9]", token);
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Slot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// How the slot for a new build is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotPolicy {
    /// Fresh random token on every build; the booted slot is not consulted.
    #[default]
    Random,
    /// Flip between "a" and "b", picking the one not currently booted.
    Alternate,
}

impl SlotPolicy {
    /// Choose the slot for a new build.
    pub fn allocate(self, current: Option<&Slot>) -> Slot {
        match self {
            SlotPolicy::Random => generate_slot(),
            SlotPolicy::Alternate => unused_slot(current),
        }
    }
}

impl FromStr for SlotPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(SlotPolicy::Random),
            "alternate" => Ok(SlotPolicy::Alternate),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for SlotPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotPolicy::Random => f.write_str("random"),
            SlotPolicy::Alternate => f.write_str("alternate"),
        }
    }
}

/// Random token of [`RANDOM_SLOT_LEN`] characters from `[a-z0-9]`.
pub fn generate_slot() -> Slot {
    let mut rng = OsRng;
    let token: String = (0..RANDOM_SLOT_LEN)
        .map(|_| SLOT_ALPHABET[rng.gen_range(0..SLOT_ALPHABET.len())] as char)
        .collect();
    Slot(token)
}

/// The alternate token not equal to `current`; the first token when the
/// current slot is unknown or not one of the pair.
pub fn unused_slot(current: Option<&Slot>) -> Slot {
    let [first, second] = ALTERNATE_SLOTS;
    let next = match current.map(Slot::as_str) {
        Some(s) if s == first => second,
        _ => first,
    };
    Slot(next.to_string())
}
