mod seaorm_storage;

pub use seaorm_storage::SeaOrmStorage;
