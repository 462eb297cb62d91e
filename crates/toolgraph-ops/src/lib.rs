pub mod ops_check;
pub mod ops_plan;
pub mod ops_setup;
pub mod ops_tree;
