//! Tensor API.
//!
//! Tensors are the inputs and outputs of neural networks. A tensor is nothing more than an
//! N-dimensional array of `f32`s, which is all the landmark networks used here consume and
//! produce.

use std::fmt;

use tinyvec::TinyVec;

use crate::iter::zip_exact;

/// Shape and strides of a tensor, stored back to back.
#[derive(Clone)]
struct Layout(TinyVec<[usize; 8]>);

impl Layout {
    fn from_shape(shape: &[usize]) -> Self {
        let mut vec = TinyVec::from(shape);
        vec.extend(shape.iter().map(|_| 0));

        // compute strides
        let mut stride = 1;
        for (out, size) in zip_exact(
            vec[shape.len()..].iter_mut().rev(),
            shape.iter().copied().rev(),
        ) {
            *out = stride;
            stride *= size;
        }

        Self(vec)
    }

    fn shape(&self) -> &[usize] {
        &self.0[..self.0.len() / 2]
    }

    fn elements(&self) -> usize {
        self.shape().iter().product()
    }

    fn strides(&self) -> &[usize] {
        &self.0[self.0.len() / 2..]
    }

    fn remove_prefix(&self, num: usize) -> Layout {
        assert!(num <= self.shape().len());

        let mut vec = TinyVec::with_capacity(self.shape().len() - num);
        for &size in &self.shape()[num..] {
            vec.push(size);
        }
        for &stride in &self.strides()[num..] {
            vec.push(stride);
        }
        Layout(vec)
    }
}

/// Iterates over all index vectors of a given shape, in row-major order.
struct ShapeIndices<const N: usize> {
    shape: [usize; N],
    last: [usize; N],
    first: bool,
}

impl<const N: usize> ShapeIndices<N> {
    fn new(shape: [usize; N]) -> Self {
        Self {
            shape,
            last: [0; N],
            first: true,
        }
    }
}

impl<const N: usize> Iterator for ShapeIndices<N> {
    type Item = [usize; N];

    fn next(&mut self) -> Option<[usize; N]> {
        if self.first {
            self.first = false;
            if self.shape.iter().any(|&x| x == 0) {
                return None;
            }
            return Some(self.last);
        }

        let mut has_next = false;
        for (next, shape) in zip_exact(self.last.iter_mut(), self.shape.iter()).rev() {
            if *next == *shape - 1 {
                *next = 0;
            } else {
                *next += 1;
                has_next = true;
                break;
            }
        }

        has_next.then_some(self.last)
    }
}

/// A dynamically sized tensor of `f32` elements.
#[derive(Clone)]
pub struct Tensor {
    layout: Layout,
    data: Box<[f32]>,
}

/// A borrowed view into a [`Tensor`].
#[derive(Clone)]
pub struct TensorView<'a> {
    layout: Layout,
    data: &'a [f32],
}

impl Tensor {
    /// Creates an `N`-dimensional tensor of the given shape by calling `f` for each element.
    ///
    /// This will invoke `f` with successive indices to fill, starting with `[0, ..., 0, 0]`, then
    /// `[0, ..., 0, 1]` and so on.
    pub fn from_array_shape_fn<const N: usize, F: FnMut([usize; N]) -> f32>(
        shape: [usize; N],
        f: F,
    ) -> Self {
        let mut data = Vec::with_capacity(shape.iter().product());
        data.extend(ShapeIndices::new(shape).map(f));
        Self {
            layout: Layout::from_shape(&shape),
            data: data.into_boxed_slice(),
        }
    }

    /// Creates a tensor of the given shape by pulling elements from an iterator.
    ///
    /// # Panics
    ///
    /// `iter` must yield exactly as many elements as `shape` implies, otherwise this method will
    /// panic.
    pub fn from_iter<I: IntoIterator<Item = f32>>(shape: &[usize], iter: I) -> Self {
        let layout = Layout::from_shape(shape);
        let data: Box<_> = iter.into_iter().collect();
        assert_eq!(data.len(), layout.elements());
        Self { layout, data }
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> Self {
        Self::from_iter(
            tract.shape(),
            tract.as_slice::<f32>().unwrap().iter().copied(),
        )
    }

    pub(super) fn to_tract(&self) -> tract_onnx::prelude::Tensor {
        tract_onnx::prelude::Tensor::from_shape(self.shape(), &self.data).unwrap()
    }

    /// Returns the shape of this tensor.
    ///
    /// A tensor's shape is the number of entries in each dimension.
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Returns the number of dimensions of this tensor.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Indexes a prefix of the tensor's dimensions with `indices`.
    ///
    /// For an example, consider a tensor of shape `[2, 3, 4, 5]`. Indexing it with 2 indices
    /// `[a, b]` will return a view of shape `[4, 5]`, while indexing it with 4 indices
    /// `[a, b, c, d]` will return a view of shape `[]` (aka a single value).
    ///
    /// # Panics
    ///
    /// This method will panic if `indices` has more entries than `self` has dimensions, or if any
    /// index is out of bounds.
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'_> {
        assert!(
            N <= self.rank(),
            "attempted to index tensor of shape {:?} with {:?}",
            self.shape(),
            indices
        );

        let mut data = &*self.data;
        for ((&length, &stride), index) in self
            .layout
            .shape()
            .iter()
            .zip(self.layout.strides())
            .zip(indices)
        {
            assert!(
                index < length,
                "attempted to index tensor of shape {:?} with {:?}",
                self.shape(),
                indices
            );
            data = &data[index * stride..(index + 1) * stride];
        }
        TensorView {
            layout: self.layout.remove_prefix(indices.len()),
            data,
        }
    }

    /// Returns the values stored in a 1-dimensional tensor as a slice.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 1 dimension, otherwise this method panics.
    #[track_caller]
    pub fn as_slice(&self) -> &[f32] {
        assert_eq!(
            self.rank(),
            1,
            "attempted to access tensor of shape {:?} as slice",
            self.shape()
        );
        &self.data
    }
}

impl<'d> TensorView<'d> {
    /// Returns the shape of this tensor view.
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Returns the number of dimensions of this tensor view.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Indexes a prefix of the tensor view's dimensions with `indices`.
    ///
    /// # Panics
    ///
    /// This method will panic if `indices` has more entries than `self` has dimensions, or if any
    /// index is out of bounds.
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'d> {
        assert!(
            N <= self.rank(),
            "attempted to index tensor view of shape {:?} with {:?}",
            self.shape(),
            indices
        );
        let mut data = self.data;
        for (&stride, &index) in self.layout.strides().iter().zip(&indices) {
            data = &data[index * stride..(index + 1) * stride];
        }
        TensorView {
            layout: self.layout.remove_prefix(indices.len()),
            data,
        }
    }

    /// Returns the values stored in a 1-dimensional view as a slice.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 1 dimension, otherwise this method panics.
    #[track_caller]
    pub fn as_slice(&self) -> &[f32] {
        assert_eq!(
            self.rank(),
            1,
            "attempted to access tensor view of shape {:?} as slice",
            self.shape()
        );
        self.data
    }

    /// Returns the value stored in a 0-dimensional view.
    ///
    /// # Panics
    ///
    /// `self` must have exactly 0 dimensions, otherwise this method will panic.
    #[track_caller]
    pub fn as_singular(&self) -> f32 {
        assert_eq!(
            self.rank(),
            0,
            "attempted to access view of shape {:?} as singular element",
            self.shape(),
        );
        self.data[0]
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .finish()
    }
}

impl fmt::Debug for TensorView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorView")
            .field("shape", &self.shape())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_fn_order() {
        let tensor = Tensor::from_array_shape_fn([2, 3], |[i, j]| (i * 3 + j) as f32);
        assert_eq!(tensor.shape(), &[2, 3]);
        assert_eq!(tensor.index([0]).as_slice(), &[0.0, 1.0, 2.0]);
        assert_eq!(tensor.index([1]).as_slice(), &[3.0, 4.0, 5.0]);
        assert_eq!(tensor.index([1, 2]).as_singular(), 5.0);
    }

    #[test]
    fn nested_views() {
        let tensor = Tensor::from_array_shape_fn([2, 2, 2], |[i, j, k]| (i * 4 + j * 2 + k) as f32);
        let view = tensor.index([1]);
        assert_eq!(view.shape(), &[2, 2]);
        assert_eq!(view.index([0]).as_slice(), &[4.0, 5.0]);
        assert_eq!(view.index([1, 1]).as_singular(), 7.0);
    }
}
