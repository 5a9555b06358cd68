//! route-surface - static discovery of the HTTP API surface of Rust web services.
//!
//! Given the sources of an axum, actix-web or tide service, the library reports every route
//! (method, path and handler), the request parameters each handler reads and the shape of the
//! payload it responds with, without compiling or running the service.
//!
//! # Architecture
//!
//! 1. [`scanner`] - collects the project's `.rs` files
//! 2. [`parser`] - parses them with `syn`
//! 3. [`detector`] - finds the frameworks in use
//! 4. [`program`] - module tree, declarations and the binder that maps identifier uses to
//!    [`program::SymbolId`]s
//! 5. [`provider`] - framework knowledge behind the [`provider::CapabilityProvider`] trait
//! 6. [`tracer`] - follows router values through the program and emits [`document::RouteRecord`]s
//! 7. [`schema`] - resolves request parameters and response payloads to [`schema::Schema`] trees
//! 8. [`openapi_builder`], [`yapi_builder`] and [`serializer`] - export as a route document,
//!    OpenAPI 3.0 or a YAPI project
//!
//! # Example Usage
//!
//! ```no_run
//! use route_surface::{
//!     config::AnalyzerConfig,
//!     parser::AstParser,
//!     program::Program,
//!     provider::tide::TideProvider,
//!     scanner::FileScanner,
//!     serializer::serialize_yaml,
//!     tracer::discover,
//! };
//! use std::path::PathBuf;
//!
//! let scan = FileScanner::new(PathBuf::from("./my-service")).scan().unwrap();
//! let files = AstParser::load(&scan.rust_files, false).unwrap();
//! let program = Program::build(&files);
//!
//! let routes = discover(&program, &TideProvider, &AnalyzerConfig::default());
//! println!("{}", serialize_yaml(&routes).unwrap());
//! ```
//!
//! # Command-Line Interface
//!
//! See the [`cli`] module.

pub mod cli;
pub mod config;
pub mod detector;
pub mod document;
pub mod error;
pub mod openapi_builder;
pub mod parser;
pub mod program;
pub mod provider;
pub mod scanner;
pub mod schema;
pub mod serializer;
pub mod tracer;
pub mod yapi_builder;
