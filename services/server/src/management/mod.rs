pub mod handle_awol;
