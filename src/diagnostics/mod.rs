//! Diagnostics for pool misuse and resource pressure.
//!
//! Mirrors rustc's diagnostic levels for familiar UX.
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                  |
//! |-------|--------------------------|
//! | PP0xx | Allocation issues        |
//! | PP1xx | Lifecycle issues         |

#[cfg(any(debug_assertions, feature = "diagnostics"))]
use std::io::Write;

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - something is probably wrong or suboptimal.
    Warning,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "PP001").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

/// PP001: a fresh string allocation failed.
pub const PP001: Diagnostic = Diagnostic {
    kind: DiagnosticKind::Error,
    code: "PP001",
    message: "string allocation failed",
    note: Some("the rent call returns None; the pool stays usable"),
    help: None,
};

/// PP101: a pool was dropped while rentals were outstanding.
pub const PP101: Diagnostic = Diagnostic {
    kind: DiagnosticKind::Warning,
    code: "PP101",
    message: "pool dropped with rentals outstanding",
    note: Some("blocks still rented at teardown are not reclaimed"),
    help: Some("release every handle before dropping the pool"),
};

/// Emit a diagnostic.
pub fn emit(diag: &Diagnostic) {
    emit_inner(diag, None);
}

/// Emit a diagnostic with extra context.
pub fn emit_with_context(diag: &Diagnostic, context: &str) {
    emit_inner(diag, Some(context));
}

fn emit_inner(diag: &Diagnostic, context: Option<&str>) {
    match diag.kind {
        DiagnosticKind::Error => log::error!("[{}] {}", diag.code, diag.message),
        DiagnosticKind::Warning => log::warn!("[{}] {}", diag.code, diag.message),
    }
    if let Some(context) = context {
        log::info!("  context: {}", context);
    }
    if let Some(note) = diag.note {
        log::info!("  note: {}", note);
    }
    if let Some(help) = diag.help {
        log::info!("  help: {}", help);
    }

    #[cfg(any(debug_assertions, feature = "diagnostics"))]
    emit_to_stderr(diag, context);
}

/// Internal: emit to stderr in debug builds or under the `diagnostics`
/// feature.
#[cfg(any(debug_assertions, feature = "diagnostics"))]
fn emit_to_stderr(diag: &Diagnostic, context: Option<&str>) {
    let mut stderr = std::io::stderr();

    let _ = writeln!(
        stderr,
        "[poisonpool][{}] {}: {}",
        diag.code,
        diag.kind.prefix(),
        diag.message
    );

    if let Some(context) = context {
        let _ = writeln!(stderr, "  context: {}", context);
    }
    if let Some(note) = diag.note {
        let _ = writeln!(stderr, "  note: {}", note);
    }
    if let Some(help) = diag.help {
        let _ = writeln!(stderr, "  help: {}", help);
    }

    let _ = writeln!(stderr);
}
