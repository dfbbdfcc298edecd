//! CLI Exit Code Registry
//!
//! Single source of truth for `reclink` exit codes. Scripts rely on them.
//!
//! # Exit Codes
//!
//! | Code | Domain    | Description                                          |
//! |------|-----------|------------------------------------------------------|
//! | 0    | Universal | Success                                              |
//! | 1    | Universal | General error (unspecified)                          |
//! | 2    | Universal | CLI usage error (bad args)                           |
//! | 60   | link      | Config invalid (parse or validation failure)        |
//! | 61   | link      | Runtime error (unreadable input, schema, training)   |
//! | 62   | link      | No pair reached the threshold (`--fail-on-empty`)    |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use reclink_linkage::LinkError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
#[allow(dead_code)]
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// clap exits with this code on its own parse failures.
#[allow(dead_code)]
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Link (60-69)
// =============================================================================

/// Config file failed to parse or validate, or a CLI override made it invalid.
pub const EXIT_LINK_INVALID_CONFIG: u8 = 60;

/// Anything that fails while running: unreadable files, schema errors,
/// candidate generation and training failures.
pub const EXIT_LINK_RUNTIME: u8 = 61;

/// The run completed but no pair reached the match threshold.
/// Only returned with `--fail-on-empty`.
pub const EXIT_LINK_NO_MATCHES: u8 = 62;

/// Map an engine error to its exit code.
pub fn link_exit_code(err: &LinkError) -> u8 {
    match err {
        LinkError::ConfigParse(_) | LinkError::Configuration(_) => EXIT_LINK_INVALID_CONFIG,
        LinkError::Schema { .. }
        | LinkError::CandidateGeneration(_)
        | LinkError::Training { .. }
        | LinkError::Io(_) => EXIT_LINK_RUNTIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_LINK_INVALID_CONFIG,
            EXIT_LINK_RUNTIME,
            EXIT_LINK_NO_MATCHES,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn engine_errors_map_by_kind() {
        assert_eq!(
            link_exit_code(&LinkError::Configuration("x".into())),
            EXIT_LINK_INVALID_CONFIG
        );
        assert_eq!(
            link_exit_code(&LinkError::ConfigParse("x".into())),
            EXIT_LINK_INVALID_CONFIG
        );
        assert_eq!(
            link_exit_code(&LinkError::Training {
                pass: "p".into(),
                message: "m".into()
            }),
            EXIT_LINK_RUNTIME
        );
    }
}
