//! CPU pooling kernels.
//!
//! Two kernels are provided: [`FastF32Kernel`], a bounds-check-free path for the common
//! float max/average case, and [`ReferenceKernel`], the general N-d window reducer that
//! handles every element type, dilation and argmax indices. Both fan out over `N * C`
//! planes with rayon.

mod cpu;
mod fast;
mod parallel;
mod reference;
mod window;

pub use cpu::{cpu_registry, CpuPoolBackend};
pub use fast::{FastF32Kernel, FAST_F32_KERNEL_NAME};
pub use reference::{ReferenceKernel, REFERENCE_KERNEL_NAME};
