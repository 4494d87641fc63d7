//! Type information attached to instructions and variables.
//!
//! The crate does not own a type system. Callers hand in already-resolved [`IlType`]
//! values and [`MethodRef`]/[`FieldRef`] identities; the reconstruction passes only ask a
//! handful of questions of them (is this an enum, a pointer, a small integer, what is the
//! pointee size) and otherwise compare them by equality.
//!
//! [`StackType`] is the coarse evaluation-stack category every instruction result has.
//! It is what passes use for lightweight type inference when no `IlType` is at hand.

use std::fmt;

/// Evaluation-stack category of an instruction result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum StackType {
    /// The stack type could not be determined
    #[strum(serialize = "?")]
    Unknown,
    /// 32-bit integer
    #[strum(serialize = "i4")]
    I4,
    /// Native-size integer (also unmanaged pointers)
    #[strum(serialize = "i")]
    I,
    /// 64-bit integer
    #[strum(serialize = "i8")]
    I8,
    /// 32-bit float
    #[strum(serialize = "f4")]
    F4,
    /// 64-bit float
    #[strum(serialize = "f8")]
    F8,
    /// Object reference
    #[strum(serialize = "o")]
    O,
    /// Managed reference (`ref T`)
    #[strum(serialize = "ref")]
    Ref,
    /// No value
    #[strum(serialize = "void")]
    Void,
}

impl StackType {
    /// Returns true for the integer categories (`I4`, `I`, `I8`).
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, StackType::I4 | StackType::I | StackType::I8)
    }

    /// Returns true for the floating-point categories.
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, StackType::F4 | StackType::F8)
    }

    /// Bit width of an integer category, treating native ints as 64-bit.
    #[must_use]
    pub fn integer_bits(self) -> Option<u32> {
        match self {
            StackType::I4 => Some(32),
            StackType::I | StackType::I8 => Some(64),
            _ => None,
        }
    }
}

/// Signedness carried by sign-sensitive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
pub enum Sign {
    /// The operation is sign-agnostic (e.g. unchecked add, equality)
    #[default]
    None,
    /// Signed interpretation
    Signed,
    /// Unsigned interpretation
    Unsigned,
}

/// Primitive value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveType {
    /// `sbyte`
    I1,
    /// `short`
    I2,
    /// `int`
    I4,
    /// `long`
    I8,
    /// `byte`
    U1,
    /// `ushort`
    U2,
    /// `uint`
    U4,
    /// `ulong`
    U8,
    /// `nint`
    I,
    /// `nuint`
    U,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `bool`
    Bool,
    /// `char`
    Char,
}

impl PrimitiveType {
    /// Evaluation-stack category values of this type are loaded as.
    #[must_use]
    pub fn stack_type(self) -> StackType {
        match self {
            PrimitiveType::I1
            | PrimitiveType::I2
            | PrimitiveType::I4
            | PrimitiveType::U1
            | PrimitiveType::U2
            | PrimitiveType::U4
            | PrimitiveType::Bool
            | PrimitiveType::Char => StackType::I4,
            PrimitiveType::I8 | PrimitiveType::U8 => StackType::I8,
            PrimitiveType::I | PrimitiveType::U => StackType::I,
            PrimitiveType::R4 => StackType::F4,
            PrimitiveType::R8 => StackType::F8,
        }
    }

    /// Natural sign of the type. Floats and `bool` have none.
    #[must_use]
    pub fn sign(self) -> Sign {
        match self {
            PrimitiveType::I1
            | PrimitiveType::I2
            | PrimitiveType::I4
            | PrimitiveType::I8
            | PrimitiveType::I => Sign::Signed,
            PrimitiveType::U1
            | PrimitiveType::U2
            | PrimitiveType::U4
            | PrimitiveType::U8
            | PrimitiveType::U
            | PrimitiveType::Char => Sign::Unsigned,
            PrimitiveType::R4 | PrimitiveType::R8 | PrimitiveType::Bool => Sign::None,
        }
    }

    /// Size in bytes, `None` for native-size types.
    #[must_use]
    pub fn size(self) -> Option<u32> {
        match self {
            PrimitiveType::I1 | PrimitiveType::U1 | PrimitiveType::Bool => Some(1),
            PrimitiveType::I2 | PrimitiveType::U2 | PrimitiveType::Char => Some(2),
            PrimitiveType::I4 | PrimitiveType::U4 | PrimitiveType::R4 => Some(4),
            PrimitiveType::I8 | PrimitiveType::U8 | PrimitiveType::R8 => Some(8),
            PrimitiveType::I | PrimitiveType::U => None,
        }
    }

    /// Integer types that C# promotes to `int` before any arithmetic.
    #[must_use]
    pub fn is_small_integer(self) -> bool {
        matches!(
            self,
            PrimitiveType::I1
                | PrimitiveType::I2
                | PrimitiveType::U1
                | PrimitiveType::U2
                | PrimitiveType::Char
        )
    }

    /// Returns true for `nint` and `nuint`.
    #[must_use]
    pub fn is_native_integer(self) -> bool {
        matches!(self, PrimitiveType::I | PrimitiveType::U)
    }

    /// Returns true for all integer types including `char`, excluding `bool`.
    #[must_use]
    pub fn is_integer(self) -> bool {
        !matches!(
            self,
            PrimitiveType::R4 | PrimitiveType::R8 | PrimitiveType::Bool
        )
    }

    /// Inclusive value range of an integer type.
    ///
    /// Native integers report the 32-bit range, the only range that fits on every
    /// platform.
    #[must_use]
    pub fn range(self) -> Option<(i128, i128)> {
        match self {
            PrimitiveType::I1 => Some((i8::MIN.into(), i8::MAX.into())),
            PrimitiveType::U1 | PrimitiveType::Bool => Some((0, u8::MAX.into())),
            PrimitiveType::I2 => Some((i16::MIN.into(), i16::MAX.into())),
            PrimitiveType::U2 | PrimitiveType::Char => Some((0, u16::MAX.into())),
            PrimitiveType::I4 | PrimitiveType::I => Some((i32::MIN.into(), i32::MAX.into())),
            PrimitiveType::U4 | PrimitiveType::U => Some((0, u32::MAX.into())),
            PrimitiveType::I8 => Some((i64::MIN.into(), i64::MAX.into())),
            PrimitiveType::U8 => Some((0, u64::MAX.into())),
            PrimitiveType::R4 | PrimitiveType::R8 => None,
        }
    }

    /// C# keyword for this type.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            PrimitiveType::I1 => "sbyte",
            PrimitiveType::I2 => "short",
            PrimitiveType::I4 => "int",
            PrimitiveType::I8 => "long",
            PrimitiveType::U1 => "byte",
            PrimitiveType::U2 => "ushort",
            PrimitiveType::U4 => "uint",
            PrimitiveType::U8 => "ulong",
            PrimitiveType::I => "nint",
            PrimitiveType::U => "nuint",
            PrimitiveType::R4 => "float",
            PrimitiveType::R8 => "double",
            PrimitiveType::Bool => "bool",
            PrimitiveType::Char => "char",
        }
    }
}

/// A resolved type, as handed over by the type system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum IlType {
    /// The type could not be resolved
    #[default]
    Unknown,
    /// `void`
    Void,
    /// A primitive value type
    Primitive(PrimitiveType),
    /// An enum with its underlying integer type
    Enum {
        /// Full name of the enum
        name: String,
        /// Underlying storage type
        underlying: PrimitiveType,
    },
    /// A user-defined value type; `size` is known for blittable structs
    Struct {
        /// Full name of the struct
        name: String,
        /// Size in bytes when known
        size: Option<u32>,
    },
    /// A reference type other than `string` and `object`
    Class(String),
    /// `string`
    String,
    /// `object`
    Object,
    /// `T*`
    Pointer(Box<IlType>),
    /// `ref T`
    ByRef(Box<IlType>),
    /// `T?` for a value type
    Nullable(Box<IlType>),
    /// `T[]`
    Array(Box<IlType>),
    /// `dynamic`
    Dynamic,
}

impl IlType {
    /// Shorthand for a primitive type.
    #[must_use]
    pub fn primitive(prim: PrimitiveType) -> Self {
        IlType::Primitive(prim)
    }

    /// Shorthand for a pointer to `element`.
    #[must_use]
    pub fn pointer_to(element: IlType) -> Self {
        IlType::Pointer(Box::new(element))
    }

    /// Evaluation-stack category values of this type are loaded as.
    #[must_use]
    pub fn stack_type(&self) -> StackType {
        match self {
            IlType::Unknown => StackType::Unknown,
            IlType::Void => StackType::Void,
            IlType::Primitive(prim) => prim.stack_type(),
            IlType::Enum { underlying, .. } => underlying.stack_type(),
            IlType::Pointer(_) => StackType::I,
            IlType::ByRef(_) => StackType::Ref,
            IlType::Struct { .. } | IlType::Nullable(_) => StackType::O,
            IlType::Class(_)
            | IlType::String
            | IlType::Object
            | IlType::Array(_)
            | IlType::Dynamic => StackType::O,
        }
    }

    /// Primitive type used for storage: the primitive itself or an enum's underlying type.
    #[must_use]
    pub fn storage_primitive(&self) -> Option<PrimitiveType> {
        match self {
            IlType::Primitive(prim) => Some(*prim),
            IlType::Enum { underlying, .. } => Some(*underlying),
            _ => None,
        }
    }

    /// Natural sign of the type.
    #[must_use]
    pub fn sign(&self) -> Sign {
        match self {
            IlType::Pointer(_) => Sign::Unsigned,
            other => other.storage_primitive().map_or(Sign::None, PrimitiveType::sign),
        }
    }

    /// Returns true when the type system could not resolve this type.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, IlType::Unknown)
    }

    /// Returns true for enum types.
    #[must_use]
    pub fn is_enum(&self) -> bool {
        matches!(self, IlType::Enum { .. })
    }

    /// Returns true for unmanaged pointer types.
    #[must_use]
    pub fn is_pointer(&self) -> bool {
        matches!(self, IlType::Pointer(_))
    }

    /// Returns true for `sbyte`, `byte`, `short`, `ushort` and `char`.
    #[must_use]
    pub fn is_small_integer(&self) -> bool {
        matches!(self, IlType::Primitive(prim) if prim.is_small_integer())
    }

    /// Returns true for `nint` and `nuint`.
    #[must_use]
    pub fn is_native_integer(&self) -> bool {
        matches!(self, IlType::Primitive(prim) if prim.is_native_integer())
    }

    /// Size in bytes of a value of this type, when statically known.
    #[must_use]
    pub fn size_of(&self) -> Option<u32> {
        match self {
            IlType::Primitive(prim) => prim.size(),
            IlType::Enum { underlying, .. } => underlying.size(),
            IlType::Struct { size, .. } => *size,
            _ => None,
        }
    }

    /// Size of the pointee for pointer types.
    #[must_use]
    pub fn pointee_size(&self) -> Option<u32> {
        match self {
            IlType::Pointer(element) => element.size_of(),
            _ => None,
        }
    }
}

impl fmt::Display for IlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IlType::Unknown => write!(f, "?"),
            IlType::Void => write!(f, "void"),
            IlType::Primitive(prim) => write!(f, "{}", prim.keyword()),
            IlType::Enum { name, .. } | IlType::Struct { name, .. } | IlType::Class(name) => {
                write!(f, "{name}")
            }
            IlType::String => write!(f, "string"),
            IlType::Object => write!(f, "object"),
            IlType::Dynamic => write!(f, "dynamic"),
            IlType::Pointer(inner) => write!(f, "{inner}*"),
            IlType::ByRef(inner) => write!(f, "ref {inner}"),
            IlType::Nullable(inner) => write!(f, "{inner}?"),
            IlType::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

/// A resolved method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Full name of the declaring type
    pub declaring_type: String,
    /// Method name, including `get_`/`set_` prefixes for accessors
    pub name: String,
    /// Return type
    pub return_type: IlType,
    /// Number of declared parameters, excluding `this`
    pub parameter_count: usize,
    /// Whether the method is static
    pub is_static: bool,
}

impl MethodRef {
    /// Creates an instance method reference.
    #[must_use]
    pub fn instance(declaring_type: &str, name: &str, parameter_count: usize, return_type: IlType) -> Self {
        Self {
            declaring_type: declaring_type.to_string(),
            name: name.to_string(),
            return_type,
            parameter_count,
            is_static: false,
        }
    }

    /// Creates a static method reference.
    #[must_use]
    pub fn static_method(declaring_type: &str, name: &str, parameter_count: usize, return_type: IlType) -> Self {
        Self {
            is_static: true,
            ..Self::instance(declaring_type, name, parameter_count, return_type)
        }
    }

    /// Property name if this is a getter (`get_X`).
    #[must_use]
    pub fn getter_property(&self) -> Option<&str> {
        self.name.strip_prefix("get_")
    }

    /// Property name if this is a setter (`set_X`).
    #[must_use]
    pub fn setter_property(&self) -> Option<&str> {
        self.name.strip_prefix("set_")
    }

    /// Number of stack arguments the call consumes, including `this`.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.parameter_count + usize::from(!self.is_static)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

/// A resolved field reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Full name of the declaring type
    pub declaring_type: String,
    /// Field name
    pub name: String,
    /// Field type
    pub ty: IlType,
    /// Whether the field is static
    pub is_static: bool,
}

impl FieldRef {
    /// Creates an instance field reference.
    #[must_use]
    pub fn instance(declaring_type: &str, name: &str, ty: IlType) -> Self {
        Self {
            declaring_type: declaring_type.to_string(),
            name: name.to_string(),
            ty,
            is_static: false,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_stack_types() {
        assert_eq!(PrimitiveType::U1.stack_type(), StackType::I4);
        assert_eq!(PrimitiveType::U8.stack_type(), StackType::I8);
        assert_eq!(PrimitiveType::U.stack_type(), StackType::I);
        assert_eq!(PrimitiveType::R4.stack_type(), StackType::F4);
    }

    #[test]
    fn test_pointer_pointee_size() {
        let ptr = IlType::pointer_to(IlType::primitive(PrimitiveType::I4));
        assert!(ptr.is_pointer());
        assert_eq!(ptr.pointee_size(), Some(4));
        assert_eq!(ptr.stack_type(), StackType::I);

        let opaque = IlType::pointer_to(IlType::Struct {
            name: "Opaque".into(),
            size: None,
        });
        assert_eq!(opaque.pointee_size(), None);
    }

    #[test]
    fn test_enum_uses_underlying_type() {
        let color = IlType::Enum {
            name: "Color".into(),
            underlying: PrimitiveType::U1,
        };
        assert!(color.is_enum());
        assert_eq!(color.sign(), Sign::Unsigned);
        assert_eq!(color.stack_type(), StackType::I4);
        assert!(!color.is_small_integer());
    }

    #[test]
    fn test_accessor_names() {
        let getter = MethodRef::instance("C", "get_Count", 0, IlType::primitive(PrimitiveType::I4));
        assert_eq!(getter.getter_property(), Some("Count"));
        assert_eq!(getter.setter_property(), None);
        assert_eq!(getter.argument_count(), 1);
    }
}
