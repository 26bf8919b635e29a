//! Node task handles gauge data collection and uses LoRa to send data:
//! - Join the LoRa network at startup and again after every midnight.
//! - Poll the staff gauge and the rain gauge once per cycle.
//! - Log the raw values to the CSV data log and send the encoded payload with `AT+CMSG`.

use std::{
    error::Error as StdError,
    io::Error as IoError,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{Days, Local, NaiveDateTime, NaiveTime};
use log::{error, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::{self, JoinHandle},
    time,
};
use tokio_serial::SerialStream;

use super::{
    at_cmd::{AtCommand, Message},
    config::{self, Config},
    data::CompiledSensorData,
    data_log::DataLog,
    error::ConfigError,
    gauge::{self, PollOptions, WordOrder},
    lora_link::LoraLink,
    serial_port::{self, PortOptions},
};

#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    pub drrg_port: PortOptions,
    pub dsg_port: PortOptions,
    pub lora_port: PortOptions,
    pub read_timeout: Duration,
    pub poll_interval: Duration,
    pub reply_window: Duration,
    pub join_wait: Duration,
    pub data_log_path: String,
    pub word_order: WordOrder,
}

#[derive(Clone)]
pub struct NodeTask {
    opts: OptionsInner,

    task_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

#[derive(Clone)]
struct OptionsInner {
    drrg_port: PortOptions,
    dsg_port: PortOptions,
    lora_port: PortOptions,
    poll_interval: Duration,
    join_wait: Duration,
    data_log_path: String,
    cycle: CycleOptions,
}

/// Per-cycle timing and decoding options.
#[derive(Clone, Copy, Debug)]
pub struct CycleOptions {
    pub poll: PollOptions,
    pub reply_window: Duration,
}

/// The ports of one node. Built once and lent to every operation.
pub struct Session<S, R, L> {
    pub staff_gauge: S,
    pub rain_gauge: R,
    pub radio: LoraLink<L>,
}

/// Outcome of one polling cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub compiled: CompiledSensorData,
    /// Timestamp and raw values for the data log.
    pub csv_row: Vec<String>,
    /// The transmitted payload. `None` when a value did not fit its format.
    pub payload: Option<String>,
    /// Whether any gauge reading is degraded.
    pub has_error: bool,
    /// Modem replies collected after the transmission.
    pub replies: Vec<Message>,
}

const SLEEP_IDLE_MS: u64 = 100;

impl Options {
    /// Validate the configuration and convert it into task options.
    ///
    /// Missing values take their defaults. Values that bypassed the command-line checks (from the
    /// configuration file or the environment) are checked here.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let conf = config::apply_default(config);
        let word_order = match conf.float_word_order.as_deref() {
            None => WordOrder::default(),
            Some(order) => order.parse::<WordOrder>().map_err(ConfigError)?,
        };
        let read_timeout_ms = conf
            .read_timeout_ms
            .unwrap_or(config::DEF_READ_TIMEOUT_MS);
        if read_timeout_ms == 0 {
            return Err(ConfigError("readTimeoutMs must be positive".to_string()));
        }
        let poll_interval_sec = conf
            .poll_interval_sec
            .unwrap_or(config::DEF_POLL_INTERVAL_SEC);
        if poll_interval_sec == 0 {
            return Err(ConfigError("pollIntervalSec must be positive".to_string()));
        }

        Ok(Options {
            drrg_port: port_options(
                conf.drrg_path.as_deref(),
                conf.drrg_baud,
                conf.drrg_parity.as_deref(),
                conf.drrg_data_bits,
                conf.drrg_stop_bits,
            )?,
            dsg_port: port_options(
                conf.dsg_path.as_deref(),
                conf.dsg_baud,
                conf.dsg_parity.as_deref(),
                conf.dsg_data_bits,
                conf.dsg_stop_bits,
            )?,
            lora_port: port_options(
                conf.lora_path.as_deref(),
                conf.lora_baud,
                conf.lora_parity.as_deref(),
                conf.lora_data_bits,
                conf.lora_stop_bits,
            )?,
            read_timeout: Duration::from_millis(read_timeout_ms),
            poll_interval: Duration::from_secs(poll_interval_sec),
            reply_window: Duration::from_millis(
                conf.reply_window_ms
                    .unwrap_or(config::DEF_REPLY_WINDOW_MS),
            ),
            join_wait: Duration::from_millis(
                conf.join_wait_ms.unwrap_or(config::DEF_JOIN_WAIT_MS),
            ),
            data_log_path: conf.data_log_path.unwrap_or_default(),
            word_order,
        })
    }
}

impl NodeTask {
    pub fn new(opts: Options) -> Result<Self, Box<dyn StdError>> {
        let task = NodeTask {
            opts: OptionsInner {
                drrg_port: opts.drrg_port,
                dsg_port: opts.dsg_port,
                lora_port: opts.lora_port,
                poll_interval: opts.poll_interval,
                join_wait: opts.join_wait,
                data_log_path: opts.data_log_path,
                cycle: CycleOptions {
                    poll: PollOptions {
                        timeout: opts.read_timeout,
                        word_order: opts.word_order,
                    },
                    reply_window: opts.reply_window,
                },
            },
            task_handle: Arc::new(Mutex::new(None)),
        };
        {
            let handle = create_event_loop(task.clone());
            match task.task_handle.lock() {
                Err(e) => return Err(e.to_string().into()),
                Ok(mut mutex) => *mutex = Some(handle),
            }
        }
        Ok(task)
    }
}

impl Session<SerialStream, SerialStream, SerialStream> {
    /// Open the three serial ports.
    pub fn open(
        dsg: &PortOptions,
        drrg: &PortOptions,
        lora: &PortOptions,
    ) -> Result<Self, IoError> {
        Ok(Session {
            staff_gauge: serial_port::open(dsg)?,
            rain_gauge: serial_port::open(drrg)?,
            radio: LoraLink::open(lora)?,
        })
    }
}

/// Send `AT+JOIN` and collect the modem replies for `wait`.
pub async fn join_network<S, R, L>(
    session: &mut Session<S, R, L>,
    wait: Duration,
) -> Result<Vec<Message>, IoError>
where
    L: AsyncRead + AsyncWrite + Unpin,
{
    const FN_NAME: &'static str = "join_network";

    session.radio.send(AtCommand::Join, None).await?;
    let replies = session.radio.collect(wait).await?;
    if replies.is_empty() {
        warn!("[{}] no reply from LoRa node", FN_NAME);
    }
    Ok(replies)
}

/// Poll both gauges, encode the payload and send it.
///
/// Decode and format errors are logged and reflected in the report. Only port I/O failures are
/// returned as `Err`.
pub async fn run_cycle<S, R, L>(
    session: &mut Session<S, R, L>,
    now: NaiveDateTime,
    opts: &CycleOptions,
) -> Result<CycleReport, IoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
    L: AsyncRead + AsyncWrite + Unpin,
{
    const FN_NAME: &'static str = "run_cycle";

    let dsg = gauge::get_dsg_data(&mut session.staff_gauge, now, &opts.poll).await?;
    let drrg = gauge::get_drrg_data(&mut session.rain_gauge, now, &opts.poll).await?;
    let has_error = dsg.has_error() || drrg.has_error();
    let compiled = CompiledSensorData::new(vec![dsg.data, drrg.data]);
    let csv_row = compiled.csv_row(now);

    let payload = match compiled.full_payload(now) {
        Err(e) => {
            error!("[{}] encode payload error: {}", FN_NAME, e);
            None
        }
        Ok(payload) => Some(payload),
    };

    let mut replies = vec![];
    if let Some(payload) = payload.as_ref() {
        session.radio.send(AtCommand::Cmsg, Some(payload.as_str())).await?;
        replies = session.radio.collect(opts.reply_window).await?;
    }

    Ok(CycleReport {
        compiled,
        csv_row,
        payload,
        has_error,
        replies,
    })
}

/// Start of the day after `now`.
pub fn next_midnight(now: NaiveDateTime) -> NaiveDateTime {
    let day = now.date().checked_add_days(Days::new(1)).unwrap_or(now.date());
    day.and_time(NaiveTime::default())
}

/// To create an event loop runtime task.
fn create_event_loop(task: NodeTask) -> JoinHandle<()> {
    task::spawn(async move {
        const FN_NAME: &'static str = "event_loop";

        let data_log = DataLog::new(task.opts.data_log_path.as_str());
        let mut session = connect_ports(&task).await;
        let mut next_day = next_midnight(Local::now().naive_local());
        loop {
            let now = Local::now().naive_local();
            if now > next_day {
                if let Err(e) = join_network(&mut session, task.opts.join_wait).await {
                    error!("[{}] rejoin error: {}", FN_NAME, e);
                }
                if let Err(e) = data_log.rotate(now) {
                    error!("[{}] rotate data log error: {}", FN_NAME, e);
                }
                next_day = next_midnight(now);
            }

            match run_cycle(&mut session, now, &task.opts.cycle).await {
                Err(e) => {
                    error!("[{}] cycle I/O error: {}", FN_NAME, e);
                    session = reconnect(session, || connect_ports(&task)).await;
                    continue;
                }
                Ok(report) => {
                    if let Err(e) = data_log.append(report.csv_row.as_slice()) {
                        error!("[{}] write data log error: {}", FN_NAME, e);
                    }
                    match report.payload.as_ref() {
                        None => warn!("[{}] nothing sent", FN_NAME),
                        Some(payload) => info!(
                            "[{}] sent {} (degraded: {}, replies: {})",
                            FN_NAME,
                            payload,
                            report.has_error,
                            report.replies.len()
                        ),
                    }
                }
            }

            time::sleep(task.opts.poll_interval).await;
        }
    })
}

/// Close the `old` ports, then connect again.
///
/// Serial ports are opened exclusively, so the old handles must be gone before the same devices are
/// opened again.
async fn reconnect<T, F, Fut>(old: T, connect: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    drop(old);
    connect().await
}

async fn connect_ports(task: &NodeTask) -> Session<SerialStream, SerialStream, SerialStream> {
    const FN_NAME: &'static str = "connect_ports";

    loop {
        time::sleep(Duration::from_millis(SLEEP_IDLE_MS)).await;
        let mut session = match Session::open(
            &task.opts.dsg_port,
            &task.opts.drrg_port,
            &task.opts.lora_port,
        ) {
            Err(e) => {
                error!("[{}] open ports error: {}", FN_NAME, e);
                continue;
            }
            Ok(session) => session,
        };
        if let Err(e) = join_network(&mut session, task.opts.join_wait).await {
            error!("[{}] join network error: {}", FN_NAME, e);
            continue;
        }
        info!("[{}] connected to ports", FN_NAME);
        break session;
    }
}

fn port_options(
    path: Option<&str>,
    baud_rate: Option<u32>,
    parity: Option<&str>,
    data_bits: Option<u8>,
    stop_bits: Option<u8>,
) -> Result<PortOptions, ConfigError> {
    let mut opts = PortOptions::new(
        path.unwrap_or_default(),
        baud_rate.unwrap_or(config::DEF_BAUD),
    );
    if let Some(parity) = parity {
        opts.parity = serial_port::parse_parity(parity).map_err(ConfigError)?;
    }
    if let Some(bits) = data_bits {
        opts.data_bits = serial_port::parse_data_bits(bits).map_err(ConfigError)?;
    }
    if let Some(bits) = stop_bits {
        opts.stop_bits = serial_port::parse_stop_bits(bits).map_err(ConfigError)?;
    }
    Ok(opts)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::NaiveDate;
    use tokio_serial::{DataBits, Parity, StopBits};

    use super::*;

    #[test]
    fn options_from_default_config() {
        let opts = Options::from_config(&Config::default()).unwrap();
        assert_eq!(
            opts.drrg_port,
            PortOptions::new(config::DEF_DRRG_PATH, config::DEF_BAUD)
        );
        assert_eq!(opts.lora_port.path, config::DEF_LORA_PATH);
        assert_eq!(opts.read_timeout, Duration::from_millis(1000));
        assert_eq!(opts.poll_interval, Duration::from_secs(60));
        assert_eq!(opts.word_order, WordOrder::Transcribed);
    }

    #[test]
    fn options_with_port_framing() {
        let opts = Options::from_config(&Config {
            dsg_parity: Some("even".to_string()),
            dsg_data_bits: Some(7),
            dsg_stop_bits: Some(2),
            float_word_order: Some("pair-swapped".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(opts.dsg_port.parity, Parity::Even);
        assert_eq!(opts.dsg_port.data_bits, DataBits::Seven);
        assert_eq!(opts.dsg_port.stop_bits, StopBits::Two);
        assert_eq!(opts.drrg_port.parity, Parity::None);
        assert_eq!(opts.drrg_port.stop_bits, StopBits::One);
        assert_eq!(opts.word_order, WordOrder::PairSwapped);
    }

    #[test]
    fn options_reject_invalid_values() {
        let invalid = [
            Config {
                read_timeout_ms: Some(0),
                ..Default::default()
            },
            Config {
                poll_interval_sec: Some(0),
                ..Default::default()
            },
            Config {
                lora_parity: Some("mark".to_string()),
                ..Default::default()
            },
            Config {
                drrg_data_bits: Some(9),
                ..Default::default()
            },
            Config {
                dsg_stop_bits: Some(0),
                ..Default::default()
            },
            Config {
                float_word_order: Some("abcd".to_string()),
                ..Default::default()
            },
        ];
        for conf in invalid.iter() {
            assert!(Options::from_config(conf).is_err(), "{:?}", conf);
        }
    }

    struct Port(Arc<AtomicBool>);

    impl Drop for Port {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn reconnect_closes_old_ports_first() {
        let closed = Arc::new(AtomicBool::new(false));
        let old = Port(closed.clone());

        let seen = closed.clone();
        let new = reconnect(old, move || async move {
            assert!(seen.load(Ordering::SeqCst));
            Port(Arc::new(AtomicBool::new(false)))
        })
        .await;
        assert!(closed.load(Ordering::SeqCst));
        assert!(!new.0.load(Ordering::SeqCst));
    }

    #[test]
    fn next_midnight_is_start_of_next_day() {
        let now = NaiveDate::from_ymd_opt(2025, 9, 22)
            .unwrap()
            .and_hms_opt(10, 30, 15)
            .unwrap();
        assert_eq!(
            next_midnight(now),
            NaiveDate::from_ymd_opt(2025, 9, 23)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );

        let new_year = NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(
            next_midnight(new_year),
            NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }
}
