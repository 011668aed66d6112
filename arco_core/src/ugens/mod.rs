//! Per-kind ugen state and `real_run` bodies. Each module owns one or a
//! small family of related ugen kinds; [`super::ugen::UgenKind`] is the
//! tagged union that ties them to the registry.

pub mod blend;
pub mod dualslew;
pub mod envelope;
pub mod fader;
pub mod feedback;
pub mod rateconv;
pub mod route;
pub mod smooth;
pub mod stdistr;
pub mod sum;
pub mod windowed;
