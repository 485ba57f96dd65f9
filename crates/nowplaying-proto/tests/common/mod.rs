pub mod icy_fixture;
