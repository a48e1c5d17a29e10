//! `SQLite` persistence layer: pooling, migrations, codecs, repositories.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub(crate) mod codec;
