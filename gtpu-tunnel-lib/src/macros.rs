// Generates a wire-compatible protocol number newtype with named constants.
//
// The newtype wraps the zerocopy field type so it can sit directly inside a
// `#[repr(C, packed)]` header, while a private shadow enum (driven by strum)
// provides the human-readable names used by `Display`.
#[macro_export]
macro_rules! protocol_constants {
    (@construct_u8 $ztype:ty, $val:expr) => { $val };

    (@construct_new $ztype:ty, $val:expr) => { <$ztype>::new($val) };

    (@impl $type_name:ident, $ztype:ty, $primitive:ty, $strategy:ident, $( $const_name:ident = $val:expr; )+ ) => {
        paste::paste! {
            #[doc = concat!("A newtype wrapper around a ", stringify!($primitive), " holding an ", stringify!($type_name), " number.")]
            #[derive(
                Clone,
                Copy,
                PartialEq,
                Eq,
                Hash,
                Debug,
                FromBytes,
                IntoBytes,
                Immutable,
                KnownLayout,
            )]
            #[repr(transparent)]
            pub struct $type_name(pub $ztype);

            impl $type_name {
                $(
                    pub const $const_name: $type_name = $type_name($crate::protocol_constants!(@$strategy $ztype, $val));
                )+

                /// Returns the raw value in host order
                #[inline]
                pub fn value(&self) -> $primitive {
                    self.0.into()
                }

                /// Returns true if the value is one of the named constants
                pub fn is_known(&self) -> bool {
                    <[< $type_name Name >] as TryFrom<$primitive>>::try_from(self.value()).is_ok()
                }
            }

            #[derive(Debug, PartialEq, strum::IntoStaticStr, Clone, Copy)]
            #[strum(serialize_all = "kebab-case")]
            #[allow(non_camel_case_types)]
            enum [< $type_name Name >] {
                $(
                    $const_name,
                )+
            }

            impl TryFrom<$primitive> for [< $type_name Name >] {
                type Error = ();
                fn try_from(v: $primitive) -> Result<Self, Self::Error> {
                    match v {
                        $(
                            $val => Ok([< $type_name Name >]::$const_name),
                        )+
                        _ => Err(()),
                    }
                }
            }

            impl From<$primitive> for $type_name {
                #[inline]
                fn from(v: $primitive) -> Self {
                    Self(v.into())
                }
            }

            impl From<$type_name> for $primitive {
                #[inline]
                fn from(v: $type_name) -> Self {
                    v.0.into()
                }
            }

            impl serde::Serialize for $type_name {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    serde::Serialize::serialize(&self.value(), serializer)
                }
            }

            impl<'de> serde::Deserialize<'de> for $type_name {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: serde::Deserializer<'de>,
                {
                    let val = <$primitive as serde::Deserialize>::deserialize(deserializer)?;
                    Ok($type_name::from(val))
                }
            }

            impl std::fmt::Display for $type_name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    let val = self.value();
                    match <[< $type_name Name >] as TryFrom<$primitive>>::try_from(val) {
                        Ok(name) => {
                            let s: &'static str = name.into();
                            f.write_str(s)
                        }
                        Err(()) => write!(f, "0x{:x}", val),
                    }
                }
            }
        }
    };

    // u8 fields need no byte-order wrapper
    (
        $type_name:ident,
        u8,
        $primitive:ty:
        $( $const_name:ident = $val:expr; )+
    ) => {
        $crate::protocol_constants!(@impl $type_name, u8, $primitive, construct_u8, $( $const_name = $val; )+ );
    };

    (
        $type_name:ident,
        $ztype:ty,
        $primitive:ty:
        $( $const_name:ident = $val:expr; )+
    ) => {
        $crate::protocol_constants!(@impl $type_name, $ztype, $primitive, construct_new, $( $const_name = $val; )+ );
    };
}
