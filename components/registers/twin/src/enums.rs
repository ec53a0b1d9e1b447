//! Encoded field enums for register values, in the same encode/decode
//! shape as `registers/src/components/*_e.rs` in this workspace's
//! hardware twin (`from_bits`/`bits`, `#[repr(u8)]`) — the part of that
//! generated style worth keeping even though the struct-of-bitfields
//! register type it was generated alongside is not.

/// A bit pattern that does not correspond to any enum variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownVariant(pub u8);

macro_rules! encoded_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $val:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[repr(u8)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum $name {
            $($variant = $val),+
        }

        impl $name {
            /// Decodes a bit pattern into an encoded enum variant.
            ///
            /// # Errors
            /// Returns [`UnknownVariant`] if `bits` matches no variant.
            pub const fn from_bits(bits: u8) -> Result<Self, UnknownVariant> {
                match bits {
                    $($val => Ok(Self::$variant),)+
                    other => Err(UnknownVariant(other)),
                }
            }

            #[must_use]
            pub const fn bits(self) -> u8 {
                self as u8
            }
        }
    };
}

encoded_enum!(
    /// Input-assembly primitive topology (Section 4.3).
    PrimitiveMode {
        Triangle = 0,
        TriangleStrip = 1,
        TriangleFan = 2,
        Quad = 3,
        QuadStrip = 4,
    }
);

encoded_enum!(
    /// Depth/stencil compare function.
    CompareFunc {
        Less = 0,
        Lequal = 1,
        Equal = 2,
        Gequal = 3,
        Greater = 4,
        Notequal = 5,
        Always = 6,
        Never = 7,
    }
);

encoded_enum!(
    /// Face-culling mode applied by Triangle Setup (Section 4.4).
    CullMode {
        CullNone = 0,
        CullCw = 1,
        CullCcw = 2,
    }
);

encoded_enum!(
    /// Additive/alpha blend factor (source or destination side).
    BlendFactor {
        Zero = 0,
        One = 1,
        SrcAlpha = 2,
        OneMinusSrcAlpha = 3,
        DstAlpha = 4,
        OneMinusDstAlpha = 5,
        SrcColor = 6,
        OneMinusSrcColor = 7,
    }
);

encoded_enum!(
    /// Bound texture's pixel encoding.
    TextureFormat {
        Rgba8888 = 0,
        Rgb565 = 1,
        R8 = 2,
    }
);

encoded_enum!(
    /// Texel filtering mode (`GPU_NEAREST` / `GPU_LINEAR`).
    TexFilter {
        Nearest = 0,
        Linear = 1,
    }
);

encoded_enum!(
    /// Texture coordinate wrap mode.
    WrapMode {
        Repeat = 0,
        Clamp = 1,
        Mirror = 2,
    }
);
