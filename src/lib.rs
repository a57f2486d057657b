//! Bead pattern editor core: perceptual palette matching, photo and pattern
//! conversion, and a sparse, growable bead grid with undo history.

pub mod canvas;
pub mod cli;
pub mod color;
pub mod components;
pub mod io;
pub mod logger;
pub mod ops;
pub mod palette;
pub mod project;
pub mod settings;
