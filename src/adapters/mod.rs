//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements         | Connects to                     |
//! |-----------------|--------------------|---------------------------------|
//! | `serial`        | Connector          | USB/UART serial port            |
//! | `http_sink`     | TelemetrySink      | Remote telemetry endpoint       |
//! | `file_store`    | LocalStore         | Queue files + JSONL archive     |
//! | `memory`        | LocalStore         | In-process (tests, dry runs)    |
//! | `config_source` | ConfigSource       | TOML device/appliance tables    |
//! | `log_sink`      | EventSink          | `log` facade                    |
//! | `time`          | Clock              | System clock                    |

pub mod config_source;
pub mod file_store;
pub mod http_sink;
pub mod log_sink;
pub mod memory;
pub mod serial;
pub mod time;
