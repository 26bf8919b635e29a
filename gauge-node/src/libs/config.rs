//! Program configurations.

use std::env;

use clap::{Arg, ArgMatches, Command, value_parser};
use serde::Deserialize;

use super::serial_port::PARITY_VALUES;

/// Configuration file object.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    /// Rain gauge serial port device path such as `/dev/ttyUSB0` or `COM1`.
    #[serde(rename = "drrgPath")]
    pub drrg_path: Option<String>,
    #[serde(rename = "drrgBaud")]
    pub drrg_baud: Option<u32>,
    /// `none`, `odd` or `even`.
    #[serde(rename = "drrgParity")]
    pub drrg_parity: Option<String>,
    #[serde(rename = "drrgDataBits")]
    pub drrg_data_bits: Option<u8>,
    #[serde(rename = "drrgStopBits")]
    pub drrg_stop_bits: Option<u8>,
    /// Staff gauge serial port device path.
    #[serde(rename = "dsgPath")]
    pub dsg_path: Option<String>,
    #[serde(rename = "dsgBaud")]
    pub dsg_baud: Option<u32>,
    /// `none`, `odd` or `even`.
    #[serde(rename = "dsgParity")]
    pub dsg_parity: Option<String>,
    #[serde(rename = "dsgDataBits")]
    pub dsg_data_bits: Option<u8>,
    #[serde(rename = "dsgStopBits")]
    pub dsg_stop_bits: Option<u8>,
    /// LoRa modem serial port device path.
    #[serde(rename = "loraPath")]
    pub lora_path: Option<String>,
    #[serde(rename = "loraBaud")]
    pub lora_baud: Option<u32>,
    /// `none`, `odd` or `even`.
    #[serde(rename = "loraParity")]
    pub lora_parity: Option<String>,
    #[serde(rename = "loraDataBits")]
    pub lora_data_bits: Option<u8>,
    #[serde(rename = "loraStopBits")]
    pub lora_stop_bits: Option<u8>,
    /// Time to wait for a gauge reply.
    #[serde(rename = "readTimeoutMs")]
    pub read_timeout_ms: Option<u64>,
    #[serde(rename = "pollIntervalSec")]
    pub poll_interval_sec: Option<u64>,
    /// Time to collect modem replies after sending a payload.
    #[serde(rename = "replyWindowMs")]
    pub reply_window_ms: Option<u64>,
    /// Time to collect modem replies after `AT+JOIN`.
    #[serde(rename = "joinWaitMs")]
    pub join_wait_ms: Option<u64>,
    #[serde(rename = "dataLogPath")]
    pub data_log_path: Option<String>,
    /// `transcribed` or `pair-swapped`.
    #[serde(rename = "floatWordOrder")]
    pub float_word_order: Option<String>,
}

pub const DEF_DRRG_PATH: &'static str = "/dev/ttyUSB0";
pub const DEF_DSG_PATH: &'static str = "/dev/ttyUSB1";
pub const DEF_LORA_PATH: &'static str = "/dev/ttyS0";
pub const DEF_BAUD: u32 = 9600;
pub const DEF_PARITY: &'static str = "none";
pub const DEF_DATA_BITS: u8 = 8;
pub const DEF_STOP_BITS: u8 = 1;
pub const DEF_READ_TIMEOUT_MS: u64 = 1000;
pub const DEF_POLL_INTERVAL_SEC: u64 = 60;
pub const DEF_REPLY_WINDOW_MS: u64 = 500;
pub const DEF_JOIN_WAIT_MS: u64 = 5000;
pub const DEF_DATA_LOG_PATH: &'static str = "data_log.csv";
pub const DEF_FLOAT_WORD_ORDER: &'static str = "transcribed";

/// To register Clap arguments.
pub fn reg_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("gauge-node.drrg-path")
            .long("gauge-node.drrg-path")
            .help("Rain gauge device path such as `/dev/ttyUSB0` or `COM1`")
            .num_args(1),
    )
    .arg(
        Arg::new("gauge-node.drrg-baud")
            .long("gauge-node.drrg-baud")
            .help("Rain gauge baud rate")
            .num_args(1)
            .value_parser(value_parser!(u32)),
    )
    .arg(
        Arg::new("gauge-node.drrg-parity")
            .long("gauge-node.drrg-parity")
            .help("Rain gauge parity")
            .num_args(1)
            .value_parser(PARITY_VALUES),
    )
    .arg(
        Arg::new("gauge-node.drrg-data-bits")
            .long("gauge-node.drrg-data-bits")
            .help("Rain gauge data bits")
            .num_args(1)
            .value_parser(value_parser!(u8).range(5..=8)),
    )
    .arg(
        Arg::new("gauge-node.drrg-stop-bits")
            .long("gauge-node.drrg-stop-bits")
            .help("Rain gauge stop bits")
            .num_args(1)
            .value_parser(value_parser!(u8).range(1..=2)),
    )
    .arg(
        Arg::new("gauge-node.dsg-path")
            .long("gauge-node.dsg-path")
            .help("Staff gauge device path")
            .num_args(1),
    )
    .arg(
        Arg::new("gauge-node.dsg-baud")
            .long("gauge-node.dsg-baud")
            .help("Staff gauge baud rate")
            .num_args(1)
            .value_parser(value_parser!(u32)),
    )
    .arg(
        Arg::new("gauge-node.dsg-parity")
            .long("gauge-node.dsg-parity")
            .help("Staff gauge parity")
            .num_args(1)
            .value_parser(PARITY_VALUES),
    )
    .arg(
        Arg::new("gauge-node.dsg-data-bits")
            .long("gauge-node.dsg-data-bits")
            .help("Staff gauge data bits")
            .num_args(1)
            .value_parser(value_parser!(u8).range(5..=8)),
    )
    .arg(
        Arg::new("gauge-node.dsg-stop-bits")
            .long("gauge-node.dsg-stop-bits")
            .help("Staff gauge stop bits")
            .num_args(1)
            .value_parser(value_parser!(u8).range(1..=2)),
    )
    .arg(
        Arg::new("gauge-node.lora-path")
            .long("gauge-node.lora-path")
            .help("LoRa modem device path")
            .num_args(1),
    )
    .arg(
        Arg::new("gauge-node.lora-baud")
            .long("gauge-node.lora-baud")
            .help("LoRa modem baud rate")
            .num_args(1)
            .value_parser(value_parser!(u32)),
    )
    .arg(
        Arg::new("gauge-node.lora-parity")
            .long("gauge-node.lora-parity")
            .help("LoRa modem parity")
            .num_args(1)
            .value_parser(PARITY_VALUES),
    )
    .arg(
        Arg::new("gauge-node.lora-data-bits")
            .long("gauge-node.lora-data-bits")
            .help("LoRa modem data bits")
            .num_args(1)
            .value_parser(value_parser!(u8).range(5..=8)),
    )
    .arg(
        Arg::new("gauge-node.lora-stop-bits")
            .long("gauge-node.lora-stop-bits")
            .help("LoRa modem stop bits")
            .num_args(1)
            .value_parser(value_parser!(u8).range(1..=2)),
    )
    .arg(
        Arg::new("gauge-node.read-timeout-ms")
            .long("gauge-node.read-timeout-ms")
            .help("Time to wait for a gauge reply in milliseconds")
            .num_args(1)
            .value_parser(value_parser!(u64).range(1..)),
    )
    .arg(
        Arg::new("gauge-node.poll-interval-sec")
            .long("gauge-node.poll-interval-sec")
            .help("Seconds between two polling cycles")
            .num_args(1)
            .value_parser(value_parser!(u64).range(1..)),
    )
    .arg(
        Arg::new("gauge-node.reply-window-ms")
            .long("gauge-node.reply-window-ms")
            .help("Time to collect LoRa replies after a payload in milliseconds")
            .num_args(1)
            .value_parser(value_parser!(u64)),
    )
    .arg(
        Arg::new("gauge-node.join-wait-ms")
            .long("gauge-node.join-wait-ms")
            .help("Time to collect LoRa replies after joining in milliseconds")
            .num_args(1)
            .value_parser(value_parser!(u64)),
    )
    .arg(
        Arg::new("gauge-node.data-log-path")
            .long("gauge-node.data-log-path")
            .help("CSV data log file")
            .num_args(1),
    )
    .arg(
        Arg::new("gauge-node.float-word-order")
            .long("gauge-node.float-word-order")
            .help("Byte order of rain gauge floats")
            .num_args(1)
            .value_parser(["transcribed", "pair-swapped"]),
    )
}

/// To read input arguments from command-line arguments and environment variables.
///
/// This function will call [`apply_default()`] to fill missing values so you do not need call it
/// again.
pub fn read_args(args: &ArgMatches) -> Config {
    apply_default(&Config {
        drrg_path: get_string(args, "gauge-node.drrg-path", "GAUGE_NODE_DRRG_PATH"),
        drrg_baud: get_number(args, "gauge-node.drrg-baud", "GAUGE_NODE_DRRG_BAUD"),
        drrg_parity: get_string(args, "gauge-node.drrg-parity", "GAUGE_NODE_DRRG_PARITY"),
        drrg_data_bits: get_number(
            args,
            "gauge-node.drrg-data-bits",
            "GAUGE_NODE_DRRG_DATA_BITS",
        ),
        drrg_stop_bits: get_number(
            args,
            "gauge-node.drrg-stop-bits",
            "GAUGE_NODE_DRRG_STOP_BITS",
        ),
        dsg_path: get_string(args, "gauge-node.dsg-path", "GAUGE_NODE_DSG_PATH"),
        dsg_baud: get_number(args, "gauge-node.dsg-baud", "GAUGE_NODE_DSG_BAUD"),
        dsg_parity: get_string(args, "gauge-node.dsg-parity", "GAUGE_NODE_DSG_PARITY"),
        dsg_data_bits: get_number(
            args,
            "gauge-node.dsg-data-bits",
            "GAUGE_NODE_DSG_DATA_BITS",
        ),
        dsg_stop_bits: get_number(
            args,
            "gauge-node.dsg-stop-bits",
            "GAUGE_NODE_DSG_STOP_BITS",
        ),
        lora_path: get_string(args, "gauge-node.lora-path", "GAUGE_NODE_LORA_PATH"),
        lora_baud: get_number(args, "gauge-node.lora-baud", "GAUGE_NODE_LORA_BAUD"),
        lora_parity: get_string(args, "gauge-node.lora-parity", "GAUGE_NODE_LORA_PARITY"),
        lora_data_bits: get_number(
            args,
            "gauge-node.lora-data-bits",
            "GAUGE_NODE_LORA_DATA_BITS",
        ),
        lora_stop_bits: get_number(
            args,
            "gauge-node.lora-stop-bits",
            "GAUGE_NODE_LORA_STOP_BITS",
        ),
        read_timeout_ms: get_number(
            args,
            "gauge-node.read-timeout-ms",
            "GAUGE_NODE_READ_TIMEOUT_MS",
        ),
        poll_interval_sec: get_number(
            args,
            "gauge-node.poll-interval-sec",
            "GAUGE_NODE_POLL_INTERVAL_SEC",
        ),
        reply_window_ms: get_number(
            args,
            "gauge-node.reply-window-ms",
            "GAUGE_NODE_REPLY_WINDOW_MS",
        ),
        join_wait_ms: get_number(args, "gauge-node.join-wait-ms", "GAUGE_NODE_JOIN_WAIT_MS"),
        data_log_path: get_string(
            args,
            "gauge-node.data-log-path",
            "GAUGE_NODE_DATA_LOG_PATH",
        ),
        float_word_order: get_string(
            args,
            "gauge-node.float-word-order",
            "GAUGE_NODE_FLOAT_WORD_ORDER",
        ),
    })
}

/// Fill missing configuration with default values.
pub fn apply_default(config: &Config) -> Config {
    Config {
        drrg_path: match config.drrg_path.as_ref() {
            None => Some(DEF_DRRG_PATH.to_string()),
            Some(path) => Some(path.clone()),
        },
        drrg_baud: config.drrg_baud.or(Some(DEF_BAUD)),
        drrg_parity: match config.drrg_parity.as_ref() {
            None => Some(DEF_PARITY.to_string()),
            Some(parity) => Some(parity.clone()),
        },
        drrg_data_bits: config.drrg_data_bits.or(Some(DEF_DATA_BITS)),
        drrg_stop_bits: config.drrg_stop_bits.or(Some(DEF_STOP_BITS)),
        dsg_path: match config.dsg_path.as_ref() {
            None => Some(DEF_DSG_PATH.to_string()),
            Some(path) => Some(path.clone()),
        },
        dsg_baud: config.dsg_baud.or(Some(DEF_BAUD)),
        dsg_parity: match config.dsg_parity.as_ref() {
            None => Some(DEF_PARITY.to_string()),
            Some(parity) => Some(parity.clone()),
        },
        dsg_data_bits: config.dsg_data_bits.or(Some(DEF_DATA_BITS)),
        dsg_stop_bits: config.dsg_stop_bits.or(Some(DEF_STOP_BITS)),
        lora_path: match config.lora_path.as_ref() {
            None => Some(DEF_LORA_PATH.to_string()),
            Some(path) => Some(path.clone()),
        },
        lora_baud: config.lora_baud.or(Some(DEF_BAUD)),
        lora_parity: match config.lora_parity.as_ref() {
            None => Some(DEF_PARITY.to_string()),
            Some(parity) => Some(parity.clone()),
        },
        lora_data_bits: config.lora_data_bits.or(Some(DEF_DATA_BITS)),
        lora_stop_bits: config.lora_stop_bits.or(Some(DEF_STOP_BITS)),
        read_timeout_ms: config.read_timeout_ms.or(Some(DEF_READ_TIMEOUT_MS)),
        poll_interval_sec: config.poll_interval_sec.or(Some(DEF_POLL_INTERVAL_SEC)),
        reply_window_ms: config.reply_window_ms.or(Some(DEF_REPLY_WINDOW_MS)),
        join_wait_ms: config.join_wait_ms.or(Some(DEF_JOIN_WAIT_MS)),
        data_log_path: match config.data_log_path.as_ref() {
            None => Some(DEF_DATA_LOG_PATH.to_string()),
            Some(path) => Some(path.clone()),
        },
        float_word_order: match config.float_word_order.as_ref() {
            None => Some(DEF_FLOAT_WORD_ORDER.to_string()),
            Some(order) => Some(order.clone()),
        },
    }
}

fn get_string(args: &ArgMatches, id: &str, env_key: &str) -> Option<String> {
    match args.get_one::<String>(id) {
        None => match env::var(env_key) {
            Err(_) => None,
            Ok(v) => Some(v),
        },
        Some(v) => Some(v.clone()),
    }
}

fn get_number<T>(args: &ArgMatches, id: &str, env_key: &str) -> Option<T>
where
    T: Clone + Send + Sync + std::str::FromStr + 'static,
{
    match args.get_one::<T>(id) {
        None => match env::var(env_key) {
            Err(_) => None,
            Ok(v) => v.parse::<T>().ok(),
        },
        Some(v) => Some(v.clone()),
    }
}
