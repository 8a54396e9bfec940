//! Macros for declaring state tags.

/// Generate a state tag enum and its `State` implementation.
///
/// Variants are named after themselves unless a display name is given with
/// `= "name"`.
///
/// # Example
///
/// ```
/// use fsm_binder::state_enum;
/// use fsm_binder::core::State;
///
/// state_enum! {
///     pub enum Light {
///         Go = "go",
///         PrepareToStop = "prepareToStop",
///         Stop = "stop",
///     }
/// }
///
/// assert_eq!(Light::PrepareToStop.name(), "prepareToStop");
/// ```
#[macro_export]
macro_rules! state_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $(= $label:literal)?
            ),* $(,)?
        }

        $(final: [$($final:ident),* $(,)?])?
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $crate::core::State for $name {
            fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $crate::__state_label!($variant $(, $label)?)),*
                }
            }

            fn is_final(&self) -> bool {
                match self {
                    $($(Self::$final => true,)*)?
                    #[allow(unreachable_patterns)]
                    _ => false,
                }
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __state_label {
    ($variant:ident) => {
        stringify!($variant)
    };
    ($variant:ident, $label:literal) => {
        $label
    };
}
