//! Translation rules, one module per family of plan nodes.

mod aggregate;
mod join;
mod relational;
mod set_ops;
mod sort;
mod unnest;
mod window;
