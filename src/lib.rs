// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cildecomp
//!
//! Structured control-flow and expression reconstruction for stack-based bytecode.
//!
//! `cildecomp` takes a function body that has already been lifted into a tree of typed
//! instructions and turns it into readable C#-like source: loops instead of back edges,
//! `switch` statements instead of comparison cascades, `x += 1` instead of
//! load/add/store sequences, and exactly the parentheses the operator precedence needs.
//!
//! ## Features
//!
//! - **Instruction trees** - an arena of typed instructions with cached effect flags and
//!   variable use lists kept in sync with every edit
//! - **Pattern matching** - declarative, backtracking tree patterns with captures
//! - **Value-set analysis** - [`analysis::LongSet`] and a symbolic evaluator that relate
//!   comparison chains to the set of values reaching each branch
//! - **Reconstruction passes** - loops, switches, `if`/`else` and compound assignments
//! - **Syntax trees** - a typestate tree that is mutable while rewriting and frozen once
//!   finished, with a precedence-aware parentheses visitor and a printer
//! - **Parallel batches** - independent bodies are processed on the rayon pool
//!
//! ## Quick Start
//!
//! ```rust
//! use cildecomp::prelude::*;
//!
//! let mut func = ILFunction::new("Add");
//! func.set_return_type(IlType::primitive(PrimitiveType::I4));
//! let a = func.add_variable(ILVariable::new(
//!     VariableKind::Parameter,
//!     IlType::primitive(PrimitiveType::I4),
//!     "a",
//! ));
//! let left = func.ld_loc(a);
//! let right = func.ldc_i4(1);
//! let sum = func.binary(BinaryNumericOperator::Add, left, right)?;
//! let ret = func.ret(Some(sum))?;
//! let entry = func.block(&[ret])?;
//! let body = func.body();
//! func.add_child(body, entry)?;
//!
//! let settings = DecompilerSettings::default();
//! let tree = Decompiler::new(&settings).decompile(func, None)?;
//! assert_eq!(tree.to_text(), "static int Add(int a) {\n    return a + 1;\n}\n");
//! # Ok::<(), cildecomp::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`il`] - the instruction model and its editing primitives
//! - [`pattern`] - the tree pattern engine shared by instruction and syntax trees
//! - [`analysis`] - value sets, symbolic evaluation, block graphs and switch recognition
//! - [`transforms`] - the rewriting passes, each an [`transforms::ILTransform`]
//! - [`ast`] - the output syntax tree, its builder, parentheses visitor and printer
//! - [`pipeline`] - the [`pipeline::Decompiler`] running everything in order
//! - [`settings`] - [`settings::DecompilerSettings`] and its presets
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result). Shapes a pass does not
//! recognise are not errors; they are left unchanged. Errors report broken tree
//! invariants, cancellation and constructs the builder cannot express:
//!
//! ```rust
//! use cildecomp::Error;
//!
//! fn describe(error: &Error) -> &'static str {
//!     match error {
//!         Error::Cancelled => "cancelled by the host",
//!         Error::NotSupported(_) => "left for a later stage",
//!         _ => "bug in a pass",
//!     }
//! }
//! assert_eq!(describe(&Error::Cancelled), "cancelled by the host");
//! ```

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cildecomp::prelude::*;
///
/// let settings = DecompilerSettings::minimal();
/// assert!(!settings.insert_parentheses_for_readability);
/// ```
pub mod prelude;

pub mod analysis;
pub mod ast;
pub mod il;
pub mod pattern;
pub mod pipeline;
pub mod settings;
pub mod transforms;

/// `cildecomp` Error type
///
/// The main error type for all operations in this crate. Provides detailed error
/// information for tree editing, pass execution and syntax tree construction.
pub use error::Error;

/// `cildecomp` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
