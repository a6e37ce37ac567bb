pub mod tilealign_cli;
pub mod tilealign_run;
