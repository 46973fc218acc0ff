//! Version staging labels and secret metadata.
//!
//! The vault keeps three rotation labels on the versions of a secret. Exactly
//! one version holds [`Stage::Current`]; at most one holds [`Stage::Pending`].
//! Labels move atomically on the vault side, and nothing here re-implements
//! those guarantees.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// A rotation staging label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// The live credential.
    Current,
    /// The credential being rotated in.
    Pending,
    /// The credential that was live before the last rotation.
    Previous,
}

impl Stage {
    /// Label string as the vault stores it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "AWSCURRENT",
            Self::Pending => "AWSPENDING",
            Self::Previous => "AWSPREVIOUS",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "AWSCURRENT" => Ok(Self::Current),
            "AWSPENDING" => Ok(Self::Pending),
            "AWSPREVIOUS" => Ok(Self::Previous),
            _ => Err(()),
        }
    }
}

/// Rotation-relevant metadata of a secret.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecretMetadata {
    /// `Some(false)` when rotation has been switched off explicitly.
    pub rotation_enabled: Option<bool>,

    /// Version token to the labels it carries. Labels the vault knows but this
    /// crate does not (custom staging labels) are dropped.
    pub version_stages: HashMap<String, BTreeSet<Stage>>,

    /// When the secret was last rotated, if the vault reports it.
    pub last_rotated: Option<DateTime<Utc>>,
}

impl SecretMetadata {
    /// Builds metadata from raw label strings, ignoring unknown labels.
    ///
    /// A version whose labels are all unknown is still recorded, with an empty
    /// label set.
    pub fn from_raw<I, T, L, S>(rotation_enabled: Option<bool>, versions: I) -> Self
    where
        I: IntoIterator<Item = (T, L)>,
        T: Into<String>,
        L: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let version_stages = versions
            .into_iter()
            .map(|(token, labels)| {
                let stages = labels
                    .into_iter()
                    .filter_map(|l| l.as_ref().parse().ok())
                    .collect();
                (token.into(), stages)
            })
            .collect();

        Self {
            rotation_enabled,
            version_stages,
            last_rotated: None,
        }
    }

    /// Labels on `token`, or `None` if the vault does not know the version.
    pub fn stages_of(&self, token: &str) -> Option<&BTreeSet<Stage>> {
        self.version_stages.get(token)
    }

    /// Returns true if `token` carries `stage`.
    pub fn has_stage(&self, token: &str, stage: Stage) -> bool {
        self.stages_of(token).is_some_and(|s| s.contains(&stage))
    }

    /// The version currently labeled `stage`, if any.
    pub fn version_with(&self, stage: Stage) -> Option<&str> {
        self.version_stages
            .iter()
            .find(|(_, stages)| stages.contains(&stage))
            .map(|(token, _)| token.as_str())
    }

    /// Rotation is only refused when explicitly disabled.
    pub fn rotation_disabled(&self) -> bool {
        self.rotation_enabled == Some(false)
    }
}
