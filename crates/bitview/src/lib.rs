//! # bitview
//!
//! Validated, bit-addressable views over fixed-layout binary buffers.
//!
//! Describe a structure as fields over bit ranges (unsigned integers, booleans
//! or enumerations, plus aliases and computed fields), attach `requires`
//! predicates to fields or to the structure, compile it once into a
//! [layout::Layout], then bind it to any byte buffer. Each field can be read,
//! written and validated on its own; the structure view folds everything into
//! one `ok()`.
//!
//! ## Example
//!
//! ```
//! use bitview::expr::{field, int, this};
//! use bitview::field::Field;
//! use bitview::layout::{Layout, Structure};
//! use bitview::view::StructureView;
//! use bitview::value::Value;
//!
//! let layout = Layout::compile(
//!     &Structure::new("Header")
//!         .field(Field::uint("version", 0, 4).requires(this().in_range(1, 3)))
//!         .field(Field::uint("length", 8, 8))
//!         .field(Field::flag("checksum_present", 16))
//!         .field(Field::uint("checksum", 24, 8).exists_if(field("checksum_present")))
//!         .requires(field("length").ge(int(4))),
//! )
//! .unwrap();
//!
//! let mut bytes = [0u8; 4];
//! let view = StructureView::new(&layout, &mut bytes).unwrap();
//! let version = view.field("version").unwrap();
//!
//! assert!(!version.ok());
//! assert!(version.could_write_value(2));
//! version.write(2);
//! view.field("length").unwrap().write(12);
//!
//! assert_eq!(version.read(), Value::Int(2));
//! assert_eq!(view.has("checksum"), Some(false));
//! assert!(view.ok());
//! ```

pub mod bits;
pub mod buffer;
pub mod compiled;
pub mod errors;
pub mod expr;
pub mod field;
pub mod layout;
#[cfg(feature = "serde")]
pub mod serde;
pub mod value;
pub mod view;
