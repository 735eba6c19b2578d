#![recursion_limit = "256"]

pub mod attention;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod gradients;
pub mod init;
pub mod metrics;
pub mod random;
pub mod recurrent;
pub mod seq2seq;
pub mod translation_checkpoint;
pub mod translation_data;
pub mod translation_inference;
pub mod translation_training;
pub mod translation_vocabulary;
