// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

//! Analyses over parsed source buffers.
//!
//! This crate holds the language-server core: the per-document symbol and
//! scope index, the strictness diagnostic engine, the signature annotation
//! subsystem, compile-time export extraction, and the workspace-wide
//! symbol index. Everything here is synchronous and free of transport
//! concerns; only the workspace index touches the filesystem.

pub mod exports;
pub mod index;
pub mod sig;
pub mod strict;
pub mod workspace;

pub use index::{Index, Scope, ScopeId, ScopeKind, Storage, Symbol, SymbolKind};
pub use sig::{CallDiagnostic, SigDiagnostic, SigError};
pub use strict::VarDiagnostic;
pub use workspace::{Definition, WorkspaceIndex};
