//! Sparse matrix helpers on top of `nalgebra-sparse` used by the Jacobian and B-matrix assembly.
pub(crate) mod cast;
pub(crate) mod conj;
pub(crate) mod slice;
pub(crate) mod stack;
