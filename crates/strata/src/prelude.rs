//! Prelude module for convenient imports.
//!
//! # Examples
//!
//! ```ignore
//! use strata::prelude::*;
//!
//! let engine = Engine::builder().from_env().with_presets().build().await?;
//! let result = engine.fetch("https://example.com/").await?;
//! ```

pub use crate::engine::{Engine, EngineBuilder};
pub use strata_core::prelude::*;
#[cfg(feature = "reqwest")]
pub use strata_reqwest::prelude::*;
#[cfg(feature = "thirtyfour")]
pub use strata_thirtyfour::prelude::*;
