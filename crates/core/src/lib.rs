//! Shared foundation of the yali toolkit.
//!
//! Keep this crate lightweight; higher layers (`yali-telemetry`, `yali-nosql`) build on it.
//!
//! * [`settings`]: layered env/file settings with post-validation.
//! * [`types`] and [`models`]: constrained primitives and result models.
//! * [`codecs`], [`archives`], [`hashes`]: JSON, compression and digests.
//! * [`strings`], [`datetimes`], [`sysinfo`], [`osfiles`]: everyday conversions and file helpers.
//! * [`memq`]: a bounded queue bridging blocking and async code.
//!
//! ## Settings
//! ```rust
//! use yali_core::settings::{Settings, SettingsLoader};
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct AppSettings {
//!     #[serde(default)]
//!     debug: bool,
//! }
//!
//! impl Settings for AppSettings {}
//!
//! let settings: AppSettings = SettingsLoader::new().vars([("DEBUG", "1")]).load().unwrap();
//! assert!(settings.debug);
//! ```

pub mod archives;
pub mod codecs;
pub mod consts;
pub mod datetimes;
pub mod error;
pub mod hashes;
pub mod memq;
pub mod models;
pub mod osfiles;
pub mod settings;
pub mod strings;
pub mod sysinfo;
pub mod types;

pub use error::{CoreError, CoreErrorExt};

pub mod prelude {
    pub use crate::error::{CoreError, CoreErrorExt};
    pub use crate::settings::{Settings, SettingsLoader};
    pub use crate::types::{NonEmptyStr, PositiveInt, Secret};
}
