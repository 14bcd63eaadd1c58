pub mod clientes;
pub mod maquinas;
pub mod recortes;
pub mod stats;
pub mod summary;
pub mod watch;
