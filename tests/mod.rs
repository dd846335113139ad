mod common;
mod pg_store_test;
