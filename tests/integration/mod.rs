//! Integration test entry point


mod chat_test;
