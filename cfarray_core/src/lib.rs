//! Compressed, randomly-accessible floating-point arrays.
//!
//! An [`Array`] stores its elements encoded block by block with a pluggable
//! [`Codec`], and decodes blocks on demand into a small cache so that element
//! access reads like an ordinary array. [`View`]s re-index an array (or
//! another view) without copying, and [`Ref`], [`Ptr`] and [`Iter`] stand in
//! for element addresses.

pub mod array;
pub mod cache;
pub mod codec;
pub mod container;
pub mod dynamic;
pub mod error;
pub mod format;
pub mod grid;
pub mod handle;
pub mod iter;
pub mod scalar;
pub mod store;
pub mod view;

pub use array::{Array, ArrayConfig};
pub use cache::{BlockCache, BlockSource, BlockState, CacheStats};
pub use codec::{BlockInfo, Codec};
pub use container::Container;
pub use dynamic::DynArray;
pub use error::{ArrayError, Result};
pub use format::BlockEntry;
pub use grid::{BlockGrid, Shape};
pub use handle::{Ptr, Ref};
pub use iter::Iter;
pub use scalar::{Scalar, ScalarKind};
pub use store::BlockStore;
pub use view::{FlatView, PrivateView, View, Window};

pub type Array1f = Array<f32, 1>;
pub type Array2f = Array<f32, 2>;
pub type Array3f = Array<f32, 3>;
pub type Array4f = Array<f32, 4>;
pub type Array1d = Array<f64, 1>;
pub type Array2d = Array<f64, 2>;
pub type Array3d = Array<f64, 3>;
pub type Array4d = Array<f64, 4>;
