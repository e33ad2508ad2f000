pub mod rescore;
