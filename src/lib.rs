//! # rule-engine
//!
//! An embeddable dynamic rule engine: a hot-reloading catalogue of
//! declarative decision rules compiled to bytecode and evaluated against a
//! caller-supplied payload.
//!
//! ## Pipeline
//!
//! ```text
//! YAML rule document
//!     ↓
//! [rule::Ruler::from_yaml]   → style-tagged rule tree (basic/advanced/switch)
//!     ↓
//! [Ruler::compile]          → every embedded `if`/`case` condition compiled
//!     ↓                       to expr bytecode (Program)
//! [Ruler::calculate]        → evaluated against a Payload → Data
//!     ↓
//! [accessor::Accessor]      → typed, dotted-path view over the result
//! ```
//!
//! The catalogue itself is kept hot: [`driver::Driver`] abstracts the
//! external coordination store a [`repository::Repository`] loads its
//! startup snapshot from and watches for subsequent changes, and
//! [`engine::Engine`] ties the two together behind a small `of(name).payload(p)`
//! facade.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use rule_engine::driver::MemoryDriver;
//! use rule_engine::engine::Engine;
//! use rule_engine::value::Payload;
//! use serde_json::Value;
//!
//! let driver = MemoryDriver::new();
//! driver.seed(
//!     "/rule/discount",
//!     b"style: advanced\nrule:\n  - if: plan == \"pro\"\n    then:\n      pct: 20\n".to_vec(),
//! );
//!
//! let (engine, _handle) = Engine::start(driver).await?;
//! let payload = Payload::from_pairs([("plan", Value::from("pro"))]);
//! let result = engine.of("/rule/discount").payload(&payload)?;
//! assert_eq!(result.int("pct"), 20);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `error` | Shared error types ([`error::ExprError`], [`error::RuleError`], [`error::EngineError`]) |
//! | `value` | Core value types: `Data`, `Payload`, `KeyValue` |
//! | `expr` | The embedded boolean/arithmetic expression language: parser, compiler, VM |
//! | `helpers` | Payload-facing helper functions (`Now`, `DaysAgo`, `ToInt`, ...) |
//! | `accessor` | Typed, dotted-path view over a calculated result |
//! | `rule` | The rule model: basic/advanced/switch styles |
//! | `document` | Loading a rule document, plus its embedded test/schema admission checks |
//! | `driver` | The external coordination-store contract, and an in-memory test double |
//! | `repository` | A hot-reloaded cache of compiled rules fed from a driver |
//! | `engine` | The public facade tying a repository to a background watch task |
//! | `config` | Hierarchical configuration loading |

pub mod accessor;
pub mod config;
pub mod document;
pub mod driver;
pub mod engine;
pub mod error;
pub mod expr;
pub mod helpers;
pub mod repository;
pub mod rule;
pub mod value;

pub use accessor::Accessor;
pub use config::Config;
pub use document::{load_ruler, load_ruler_with, validate_rules};
pub use driver::{Driver, MemoryDriver};
pub use engine::{Engine, EngineHandle};
pub use error::{EngineError, ExprError, RuleError};
pub use repository::{Container, Repository, RepositoryBuilder};
pub use rule::Ruler;
pub use value::{Data, KeyValue, Payload};
