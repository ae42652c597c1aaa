//! Thin re-export of `env-tracing-logger`'s init pattern, shared by the
//! runtime binary and any standalone stage demos.

pub fn init() -> impl Drop {
    env_tracing_logger::init()
}
