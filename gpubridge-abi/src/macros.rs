/// Declares a `#[repr(u32)]` enum whose discriminants are its wire codes,
/// together with `code()` / `from_code()` conversions.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            /// Type name used in decode error messages.
            pub const WIRE_NAME: &'static str = stringify!($name);

            /// Every variant, in code order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn code(self) -> u32 {
                self as u32
            }

            pub fn from_code(code: u32) -> Option<Self> {
                match code {
                    $(c if c == $value => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl $crate::WireCode for $name {
            const WIRE_NAME: &'static str = stringify!($name);

            fn code(self) -> u32 {
                self as u32
            }

            fn from_code(code: u32) -> Option<Self> {
                $name::from_code(code)
            }
        }
    };
}
