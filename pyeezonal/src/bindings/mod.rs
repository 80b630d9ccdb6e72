// Python bindings module

pub mod earth_engine;

pub use earth_engine::PyEarthEngine;
