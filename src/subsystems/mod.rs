//! Generic runtime scaffolding shared by the Ingestion Loop and the REST API
//! server — both implement [`runtime::Component`] and are driven by
//! [`runtime::spawn_components`] from `main.rs`.

pub mod runtime;
