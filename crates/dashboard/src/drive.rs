//! Drive export preferences: which codec and packaging a user's recordings get uploaded in, and
//! to which cloud service.

use std::{error::Error, fmt, str::FromStr};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

macro_rules! wire_enum {
    ($(#[$attr:meta])* $vis:vis enum $name:ident, $invalid:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = $invalid;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    _ => Err($invalid),
                }
            }
        }

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis struct $invalid;

        impl fmt::Display for $invalid {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!("invalid ", stringify!($name)))
            }
        }

        impl Error for $invalid {}
    };
}

wire_enum! {
    /// Audio codec of exported tracks.
    pub enum Format, InvalidFormat {
        Flac => "flac",
        Aac => "aac",
        OggFlac => "oggflac",
        HeAac => "heaac",
        Opus => "opus",
        Vorbis => "vorbis",
        Adpcm => "adpcm",
        Wav8 => "wav8",
    }
}

wire_enum! {
    /// How the exported tracks are packaged.
    pub enum Container, InvalidContainer {
        AupZip => "aupzip",
        Zip => "zip",
        Mix => "mix",
    }
}

wire_enum! {
    pub enum Service, InvalidService {
        Google => "google",
        OneDrive => "onedrive",
    }
}

impl Container {
    /// Whether the container can hold tracks encoded in `format`.
    pub fn accepts(self, format: Format) -> bool {
        match self {
            Container::AupZip => format == Format::Flac,
            Container::Zip => true,
            Container::Mix => matches!(format, Format::Flac | Format::Vorbis | Format::Aac),
        }
    }
}

/// Patron reward tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RewardTier(pub i32);

impl RewardTier {
    /// Exempt from every tier gate.
    pub const UNLIMITED: Self = Self(-1);
    pub const NONE: Self = Self(0);
    /// Lowest tier allowed to export mixed tracks.
    pub const BETTER_SUPPORTER: Self = Self(20);

    pub fn is_patron(self) -> bool {
        self != Self::NONE
    }

    pub fn can_mix(self) -> bool {
        self == Self::UNLIMITED || self >= Self::BETTER_SUPPORTER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrivePreferences {
    pub format: Format,
    pub container: Container,
    pub enabled: bool,
    pub service: Service,
}

impl Default for DrivePreferences {
    fn default() -> Self {
        Self {
            format: Format::Flac,
            container: Container::Zip,
            enabled: false,
            service: Service::Google,
        }
    }
}

/// Raw update request fields, kept as JSON values so that each one can be rejected with its own
/// message and in a fixed order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriveUpdate {
    pub format: serde_json::Value,
    pub container: serde_json::Value,
    pub enabled: serde_json::Value,
    pub service: serde_json::Value,
}

impl DriveUpdate {
    /// Anything that is not a JSON object is treated as an object without fields.
    pub fn from_json(body: &[u8]) -> Self {
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(mut fields)) => Self {
                format: fields.remove("format").unwrap_or_default(),
                container: fields.remove("container").unwrap_or_default(),
                enabled: fields.remove("enabled").unwrap_or_default(),
                service: fields.remove("service").unwrap_or_default(),
            },
            _ => Self::default(),
        }
    }

    /// Checks the update against the caller's tier. The first broken rule wins.
    pub fn validate(&self, tier: RewardTier) -> Result<DrivePreferences, DriveError> {
        if !tier.is_patron() {
            return Err(DriveError::NotPatron);
        }

        let format: Format = parse_field(&self.format).ok_or(DriveError::InvalidFormat)?;
        let container: Container =
            parse_field(&self.container).ok_or(DriveError::InvalidContainer)?;
        let service: Service = parse_field(&self.service).ok_or(DriveError::InvalidService)?;

        if !container.accepts(format) {
            return Err(DriveError::InvalidCombination);
        }
        if container == Container::Mix && !tier.can_mix() {
            return Err(DriveError::NotBetterSupporter);
        }

        let enabled = self
            .enabled
            .as_bool()
            .ok_or(DriveError::InvalidEnabledState)?;

        Ok(DrivePreferences {
            format,
            container,
            enabled,
            service,
        })
    }
}

fn parse_field<T: FromStr>(value: &serde_json::Value) -> Option<T> {
    value.as_str().and_then(|s| s.parse().ok())
}

#[derive(Debug)]
pub enum DriveError {
    MethodNotAllowed,
    Unauthorized,
    UserNotFound,
    NotPatron,
    NotBetterSupporter,
    InvalidFormat,
    InvalidContainer,
    InvalidService,
    InvalidCombination,
    InvalidEnabledState,
    Internal(eyre::Report),
}

impl DriveError {
    pub fn status(&self) -> StatusCode {
        match self {
            DriveError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            DriveError::Unauthorized => StatusCode::UNAUTHORIZED,
            DriveError::UserNotFound => StatusCode::NOT_FOUND,
            DriveError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DriveError::MethodNotAllowed => "Method not allowed",
            DriveError::Unauthorized => "Unauthorized",
            DriveError::UserNotFound => "User not found",
            DriveError::NotPatron => "User is not a patron",
            DriveError::NotBetterSupporter => "User is not a Better Supporter ($4 tier)",
            DriveError::InvalidFormat => "Invalid format",
            DriveError::InvalidContainer => "Invalid container",
            DriveError::InvalidService => "Invalid service",
            DriveError::InvalidCombination => "Invalid combination",
            DriveError::InvalidEnabledState => "Invalid enabled state",
            DriveError::Internal(_) => "Internal server error",
        }
    }
}

impl fmt::Display for DriveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveError::Internal(report) => write!(f, "{report}"),
            _ => f.write_str(self.message()),
        }
    }
}

impl Error for DriveError {}

impl From<eyre::Report> for DriveError {
    fn from(report: eyre::Report) -> Self {
        DriveError::Internal(report)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

impl IntoResponse for DriveError {
    fn into_response(self) -> Response {
        if let DriveError::Internal(report) = &self {
            error!(?report, "drive preferences update failed");
        }
        (
            self.status(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}
