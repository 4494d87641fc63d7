//! Configuration consumed by the reconstruction pipeline.
//!
//! [`DecompilerSettings`] is passed by reference into every pass and into the
//! parenthesization visitor. It is a capability description of the target language
//! (does it have native integers?) plus policy knobs for the heuristics (how much
//! readability parenthesization, whether unreachable switch cases abort the analysis).
//!
//! # Usage
//!
//! ```rust
//! use cildecomp::settings::DecompilerSettings;
//!
//! // State-machine bodies tolerate cases that the input range makes unreachable
//! let settings = DecompilerSettings::state_machine();
//! assert!(settings.allow_unreachable_cases);
//! ```

/// Settings for a decompilation run.
///
/// # Presets
///
/// - [`DecompilerSettings::default()`] - Idiomatic output for general user code
/// - [`DecompilerSettings::minimal()`] - Only the parentheses the grammar requires, no native ints
/// - [`DecompilerSettings::state_machine()`] - Tolerates unreachable switch cases
/// - [`DecompilerSettings::literal()`] - No rewriting passes, output mirrors the IL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompilerSettings {
    /// Whether the target language has `nint`/`nuint`.
    ///
    /// When false, compound assignments on native-int targets are never formed.
    pub native_integers: bool,

    /// Insert the extra parentheses a human reader expects, beyond what the grammar needs.
    pub insert_parentheses_for_readability: bool,

    /// Silently drop switch sections whose value set is empty after range narrowing.
    ///
    /// When false, such a section aborts the whole switch analysis, because it usually
    /// means the comparison chain was misidentified.
    pub allow_unreachable_cases: bool,

    /// Run natural-loop detection.
    pub loop_detection: bool,

    /// Run switch detection over if-cascades and IL switch instructions.
    pub switch_detection: bool,

    /// Run if/else reconstruction from branch targets.
    pub condition_detection: bool,

    /// Form compound assignments and increments from load/operate/store sequences.
    pub compound_assignment: bool,

    /// Minimum number of sections (default included) before an if-cascade becomes a switch.
    pub min_switch_sections: usize,
}

impl Default for DecompilerSettings {
    fn default() -> Self {
        Self {
            native_integers: true,
            insert_parentheses_for_readability: true,
            allow_unreachable_cases: false,
            loop_detection: true,
            switch_detection: true,
            condition_detection: true,
            compound_assignment: true,
            min_switch_sections: 3,
        }
    }
}

impl DecompilerSettings {
    /// Creates settings that emit only grammar-required parentheses and target a
    /// language version without native integers.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            native_integers: false,
            insert_parentheses_for_readability: false,
            ..Self::default()
        }
    }

    /// Creates settings for compiler-generated state machines.
    ///
    /// State dispatch switches routinely contain cases that the surrounding guard makes
    /// unreachable; dropping them is safe there.
    #[must_use]
    pub fn state_machine() -> Self {
        Self {
            allow_unreachable_cases: true,
            ..Self::default()
        }
    }

    /// Creates settings that disable every rewriting pass.
    ///
    /// The output keeps gotos, explicit if-chains and expanded load/operate/store forms.
    #[must_use]
    pub fn literal() -> Self {
        Self {
            loop_detection: false,
            switch_detection: false,
            condition_detection: false,
            compound_assignment: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_conservative_about_switch_cases() {
        let settings = DecompilerSettings::default();
        assert!(!settings.allow_unreachable_cases);
        assert!(settings.native_integers);
        assert_eq!(settings.min_switch_sections, 3);
    }

    #[test]
    fn test_presets() {
        assert!(!DecompilerSettings::minimal().insert_parentheses_for_readability);
        assert!(DecompilerSettings::state_machine().allow_unreachable_cases);

        let literal = DecompilerSettings::literal();
        assert!(!literal.switch_detection);
        assert!(!literal.compound_assignment);
        assert!(literal.insert_parentheses_for_readability);
    }
}
