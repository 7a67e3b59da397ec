//! Security sandbox for Ferrule tools.
//!
//! Provides:
//! - **Commands**: allow-list, metacharacter and destructive-target checks
//! - **Paths**: traversal, system directory and personal folder checks
//! - **URLs**: scheme checks and SSRF prevention
//! - **Policy**: the three checks bound to one configuration

pub mod command;
pub mod path;
pub mod policy;
pub mod url;

pub use command::{CommandValidationError, tokenize, validate_command};
pub use path::{PathValidationError, validate_path};
pub use policy::SecurityPolicy;
pub use self::url::{UrlValidationError, validate_url};
