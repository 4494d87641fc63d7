use thiserror::Error;

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvariantViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvariantViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, covering every hard failure this library can report.
///
/// Most analyses in this crate never produce an `Error`: a pattern that does not match,
/// a symbolic value that cannot be determined, or a compound assignment that fails its
/// admission gate are all reported through sentinel values (`None`, `false`,
/// [`crate::analysis::SymbolicValue::Unknown`]) and handled locally by the caller.
///
/// The variants below signal broken tree invariants (a bug in an earlier pass, not a
/// property of the decompiled program) or a cancelled run.
///
/// # Error Categories
///
/// ## Tree Invariants
/// - [`Error::InvariantViolation`] - Parent/sibling links or slot arity are inconsistent
/// - [`Error::NodeAttached`] - A node that still has a parent was attached elsewhere
/// - [`Error::InvalidSlot`] - A child index outside the slots of an instruction kind
/// - [`Error::ForeignNode`] - A node handle was used with a tree it does not belong to
///
/// ## Syntax Tree
/// - [`Error::InvalidRole`] - A child was attached under a role that rejects its kind
///
/// Mutating a finalized syntax tree is not an error value: `SyntaxTree<Frozen>` has no
/// mutating methods, so such code does not compile.
///
/// ## Driver
/// - [`Error::Cancelled`] - The embedding host requested cancellation between passes
/// - [`Error::NotSupported`] - The body uses a construct the pipeline cannot handle
///
/// # Examples
///
/// ```rust
/// use cildecomp::Error;
///
/// fn report(err: &Error) -> &'static str {
///     match err {
///         Error::Cancelled => "cancelled",
///         Error::InvariantViolation { .. } => "bug in an earlier pass",
///         _ => "other",
///     }
/// }
/// assert_eq!(report(&Error::Cancelled), "cancelled");
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A structural invariant of the instruction tree does not hold.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the violated invariant
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Invariant violated - {file}:{line}: {message}")]
    InvariantViolation {
        /// The message to be printed for the violation
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A node was attached while it still belonged to another parent.
    ///
    /// Nodes must be detached (or cloned) before they are reused.
    #[error("Node {0} is already attached to a parent")]
    NodeAttached(String),

    /// A child slot index does not exist for the given opcode.
    #[error("Opcode {opcode} has no child slot {index}")]
    InvalidSlot {
        /// Opcode name of the parent
        opcode: &'static str,
        /// Requested slot index
        index: usize,
    },

    /// A node handle from one tree was passed to another tree.
    #[error("Node handle belongs to a different tree")]
    ForeignNode,

    /// A syntax node was attached under a role that does not accept it.
    #[error("Role {role} does not accept node kind {kind}")]
    InvalidRole {
        /// Name of the rejecting role
        role: &'static str,
        /// Name of the rejected node kind
        kind: &'static str,
    },

    /// The run was cancelled between two passes.
    #[error("Decompilation was cancelled")]
    Cancelled,

    /// The body contains a construct the pipeline does not handle.
    #[error("Not supported: {0}")]
    NotSupported(String),
}
