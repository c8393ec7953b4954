use log::{debug, info};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::{
    bitmap::{bytes_for, PackedBitmap},
    command::{Command, HeatConfig},
    error::Error,
    pipeline::{transform, TransformOptions},
    raster::RasterImage,
    transport::{Transport, UsbDevice, UsbTransport},
    DEFAULT_DOT_HEIGHT,
};

/// Largest row count a single begin-bitmap command can announce.
pub const MAX_BITMAP_ROWS: usize = 255;

/// Protocol state of a printer session.
///
/// ```text
/// Opened -> Woken -> Initialized -> Configured -> Sleeping
///                                                  |  wake
///                                                  v
///                                      (state before sleeping)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    Opened,
    Woken,
    Initialized,
    Configured,
    Sleeping,
}

struct Session<T> {
    transport: T,
    state: State,
    resume: State,
}

/// Thermal printer driver.
///
/// Commands are sent one at a time through a lock around the transport,
/// so a command is never started while another transfer is in flight.
/// A failed command leaves the transport open; call [`Printer::close`] to
/// release the device.
pub struct Printer<T: Transport = UsbTransport> {
    session: Mutex<Session<T>>,
    config: Config,
}

impl Printer<UsbTransport> {
    /// Discover, open and claim the printer described by `config`.
    pub fn new(config: Config) -> Result<Self, Error> {
        let device = UsbDevice::discover(
            config.vendor_id,
            config.product_id,
            config.serial.as_deref(),
        )?;
        let transport = device.open(config.timeout)?;
        Ok(Printer::with_transport(transport, config))
    }
}

impl<T: Transport> Printer<T> {
    pub fn with_transport(transport: T, config: Config) -> Self {
        Printer {
            session: Mutex::new(Session {
                transport,
                state: State::Opened,
                resume: State::Opened,
            }),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> Result<State, Error> {
        Ok(self.lock()?.state)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session<T>>, Error> {
        self.session.lock().map_err(|_| Error::SessionPoisoned)
    }

    fn send(session: &mut Session<T>, command: &Command, delay: Duration) -> Result<(), Error> {
        let bytes = command.encode();
        debug!(
            "send {} ({} bytes) {:02X?}",
            command.name(),
            bytes.len(),
            &bytes[..bytes.len().min(16)]
        );
        session.transport.write(&bytes)?;
        if command.needs_settle_delay() && !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    /// Send a command that needs at least `required` state.
    fn command(&self, command: Command, required: State) -> Result<(), Error> {
        let mut session = self.lock()?;
        check_state(&command, session.state, required)?;
        Self::send(&mut session, &command, self.config.command_delay)
    }

    /// Bring the printer out of low-power mode.
    pub fn wake(&self) -> Result<(), Error> {
        let mut session = self.lock()?;
        Self::send(&mut session, &Command::Wake, self.config.command_delay)?;
        session.state = match session.state {
            State::Opened => State::Woken,
            State::Sleeping => session.resume,
            state => state,
        };
        Ok(())
    }

    /// Reset the printer to its power-on settings.
    pub fn init(&self) -> Result<(), Error> {
        let mut session = self.lock()?;
        check_state(&Command::Init, session.state, State::Woken)?;
        Self::send(&mut session, &Command::Init, self.config.command_delay)?;
        session.state = State::Initialized;
        Ok(())
    }

    /// Wake then initialize.
    pub fn begin(&self) -> Result<(), Error> {
        self.wake()?;
        self.init()
    }

    /// Run the start-up handshake and apply the configured heat settings.
    pub fn start(&self) -> Result<(), Error> {
        self.begin()?;
        let heat = self.config.heat;
        self.configure(heat.dots, heat.time, heat.interval)?;
        info!("Printer ready");
        Ok(())
    }

    /// Set the print mode byte. Combine [`FontMode`](crate::FontMode) flags with `.bits()`.
    pub fn font(&self, mode: u8) -> Result<(), Error> {
        self.command(Command::Font(mode), State::Initialized)
    }

    pub fn set_char_table(&self, table: u8) -> Result<(), Error> {
        self.command(Command::CharTable(table), State::Initialized)
    }

    /// Set heating dots, heating time and heating interval.
    pub fn configure(&self, dots: u8, time: u8, interval: u8) -> Result<(), Error> {
        let command = Command::HeatConfig(HeatConfig::new(dots, time, interval));
        let mut session = self.lock()?;
        check_state(&command, session.state, State::Initialized)?;
        Self::send(&mut session, &command, self.config.command_delay)?;
        session.state = State::Configured;
        Ok(())
    }

    pub fn begin_bitmap(&self, byte_width: usize, rows: usize) -> Result<(), Error> {
        let command = begin_bitmap_command(byte_width, rows)?;
        self.command(command, State::Configured)
    }

    /// Send one raster block of `rows` rows, each `width` dots wide.
    ///
    /// `bitmap` must hold exactly `ceil(width / 8) * rows` bytes. The
    /// header and the data are sent under one lock, data in a single write.
    pub fn draw_bitmap(&self, bitmap: &[u8], width: usize, rows: usize) -> Result<(), Error> {
        let byte_width = bytes_for(width);
        let expected = byte_width * rows;
        if bitmap.len() != expected {
            return Err(Error::BitmapSizeMismatch {
                expected,
                actual: bitmap.len(),
            });
        }
        let header = begin_bitmap_command(byte_width, rows)?;

        let mut session = self.lock()?;
        check_state(&header, session.state, State::Configured)?;
        Self::send(&mut session, &header, self.config.command_delay)?;
        Self::send(
            &mut session,
            &Command::BitmapData(bitmap.to_vec()),
            self.config.command_delay,
        )
    }

    /// Print a packed bitmap, split into blocks the printer can accept.
    ///
    /// Each bitmap column is one raster row, so the image height becomes the
    /// print width. The job stops at the first failed block.
    pub fn print_bitmap(&self, bitmap: &PackedBitmap) -> Result<(), Error> {
        let row_bytes = bitmap.column_bytes();
        let block = MAX_BITMAP_ROWS * row_bytes;
        debug!(
            "print bitmap {}x{}, {} bytes per row",
            bitmap.width(),
            bitmap.height(),
            row_bytes
        );
        for chunk in bitmap.bytes().chunks(block.max(1)) {
            self.draw_bitmap(chunk, bitmap.height(), chunk.len() / row_bytes)?;
        }
        Ok(())
    }

    /// Convert an image with the configured dot height, print it and feed
    /// it past the tear bar.
    pub fn print_image(&self, image: RasterImage, options: TransformOptions) -> Result<(), Error> {
        let bitmap = transform(image, self.config.dot_height, options)?;
        self.print_bitmap(&bitmap)?;
        self.feed(2)
    }

    pub fn sleep(&self) -> Result<(), Error> {
        let mut session = self.lock()?;
        check_state(&Command::Sleep, session.state, State::Woken)?;
        Self::send(&mut session, &Command::Sleep, self.config.command_delay)?;
        session.resume = session.state;
        session.state = State::Sleeping;
        Ok(())
    }

    pub fn status_back(&self, rts: bool, asb: bool) -> Result<(), Error> {
        self.command(Command::StatusBack { rts, asb }, State::Initialized)
    }

    /// Print raw text. Only single-byte characters are accepted.
    pub fn print(&self, text: &str) -> Result<(), Error> {
        self.command(Command::text(text)?, State::Initialized)
    }

    pub fn feed(&self, lines: usize) -> Result<(), Error> {
        self.print(&"\n".repeat(lines))
    }

    /// Release the interface and close the device.
    pub fn close(self) -> Result<(), Error> {
        let mut session = self.session.into_inner().map_err(|_| Error::SessionPoisoned)?;
        session.transport.close();
        info!("Printer closed");
        Ok(())
    }
}

fn check_state(command: &Command, state: State, required: State) -> Result<(), Error> {
    if state == State::Sleeping || state < required {
        return Err(Error::InvalidState {
            command: command.name(),
            state,
        });
    }
    Ok(())
}

fn begin_bitmap_command(byte_width: usize, rows: usize) -> Result<Command, Error> {
    if byte_width > u8::MAX as usize || rows > MAX_BITMAP_ROWS {
        return Err(Error::BitmapTooLarge { byte_width, rows });
    }
    Ok(Command::BeginBitmap {
        byte_width: byte_width as u8,
        rows: rows as u8,
    })
}

/// Printer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    vendor_id: u16,
    product_id: u16,
    serial: Option<String>,
    dot_height: usize,
    heat: HeatConfig,
    command_delay: Duration,
    timeout: Duration,
}

impl Config {
    /// Initialize configuration data with default values.
    ///
    /// # Example
    ///
    /// ```
    /// use thermal_raster::{Config, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
    ///
    /// let config = Config::new(DEFAULT_VENDOR_ID, DEFAULT_PRODUCT_ID).heat(10, 140, 4);
    /// assert_eq!(config.target_dot_height(), 384);
    /// ```
    pub fn new(vendor_id: u16, product_id: u16) -> Config {
        Config {
            vendor_id,
            product_id,
            serial: None,
            dot_height: DEFAULT_DOT_HEIGHT,
            heat: HeatConfig::default(),
            command_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(10),
        }
    }

    /// Only open the device reporting this USB serial number.
    pub fn serial(self, serial: String) -> Self {
        Config {
            serial: Some(serial),
            ..self
        }
    }

    /// Print-head width in dots; images are scaled to this height.
    pub fn dot_height(self, dot_height: usize) -> Self {
        Config { dot_height, ..self }
    }

    pub fn heat(self, dots: u8, time: u8, interval: u8) -> Self {
        Config {
            heat: HeatConfig::new(dots, time, interval),
            ..self
        }
    }

    /// Pause after wake and init. The firmware needs at least 100 ms.
    pub fn command_delay(self, command_delay: Duration) -> Self {
        Config {
            command_delay,
            ..self
        }
    }

    /// Bulk transfer timeout.
    pub fn timeout(self, timeout: Duration) -> Self {
        Config { timeout, ..self }
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn heat_config(&self) -> HeatConfig {
        self.heat
    }

    pub fn target_dot_height(&self) -> usize {
        self.dot_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use crate::command::FontMode;

    #[derive(Default)]
    struct Log {
        writes: Vec<Vec<u8>>,
        attempts: usize,
        closed: bool,
    }

    /// Records every write; fails the `fail_on`-th attempt (1-based).
    struct MockTransport {
        log: Arc<Mutex<Log>>,
        fail_on: Option<usize>,
    }

    impl Transport for MockTransport {
        fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
            let mut log = self.log.lock().unwrap();
            log.attempts += 1;
            if self.fail_on == Some(log.attempts) {
                return Err(Error::Transfer(rusb::Error::Pipe));
            }
            log.writes.push(buf.to_vec());
            Ok(())
        }

        fn close(&mut self) {
            self.log.lock().unwrap().closed = true;
        }
    }

    fn test_config() -> Config {
        Config::new(0x28E9, 0x0289).command_delay(Duration::from_millis(0))
    }

    fn printer_with(
        config: Config,
        fail_on: Option<usize>,
    ) -> (Printer<MockTransport>, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let transport = MockTransport {
            log: Arc::clone(&log),
            fail_on,
        };
        (Printer::with_transport(transport, config), log)
    }

    fn writes(log: &Arc<Mutex<Log>>) -> Vec<Vec<u8>> {
        log.lock().unwrap().writes.clone()
    }

    #[test]
    fn test_config_defaults_and_builders() {
        let config = Config::new(0x28E9, 0x0289);
        assert_eq!(config.vendor_id(), 0x28E9);
        assert_eq!(config.product_id(), 0x0289);
        assert_eq!(config.heat_config(), HeatConfig::new(7, 80, 2));
        assert_eq!(config.target_dot_height(), DEFAULT_DOT_HEIGHT);

        let config = config.heat(10, 140, 4).dot_height(576);
        assert_eq!(config.heat_config(), HeatConfig::new(10, 140, 4));
        assert_eq!(config.target_dot_height(), 576);
    }

    #[test]
    fn test_start_sequence() {
        let (printer, log) = printer_with(test_config().heat(10, 140, 4), None);
        printer.start().unwrap();

        assert_eq!(
            writes(&log),
            vec![
                vec![0xFF],
                vec![0x1B, 0x40],
                vec![0x1B, 0x37, 0x0A, 0x8C, 0x04]
            ]
        );
        assert_eq!(printer.state().unwrap(), State::Configured);
    }

    #[test]
    fn test_commands_require_handshake() {
        let (printer, log) = printer_with(test_config(), None);

        assert!(matches!(
            printer.init(),
            Err(Error::InvalidState {
                command: "init",
                state: State::Opened
            })
        ));
        assert!(matches!(
            printer.print("hello"),
            Err(Error::InvalidState { .. })
        ));

        printer.begin().unwrap();
        assert_eq!(printer.state().unwrap(), State::Initialized);
        assert!(matches!(
            printer.draw_bitmap(&[0; 2], 8, 2),
            Err(Error::InvalidState {
                command: "begin_bitmap",
                state: State::Initialized
            })
        ));
        assert_eq!(writes(&log), vec![vec![0xFF], vec![0x1B, 0x40]]);
    }

    #[test]
    fn test_text_commands() {
        let (printer, log) = printer_with(test_config(), None);
        printer.begin().unwrap();
        printer.font(FontMode::DOUBLE_WIDTH.bits()).unwrap();
        printer.font(0x46).unwrap();
        printer.set_char_table(0).unwrap();
        printer.status_back(true, false).unwrap();
        printer.print("Hello, world!").unwrap();
        printer.feed(2).unwrap();

        let sent = writes(&log);
        assert_eq!(sent[2], vec![0x1B, 0x21, 0x20]);
        assert_eq!(sent[3], vec![0x1B, 0x21, 0x46]);
        assert_eq!(sent[4], vec![0x1B, 0x74, 0x00]);
        assert_eq!(sent[5], vec![0x1D, 0x61, 0x20]);
        assert_eq!(sent[6], b"Hello, world!".to_vec());
        assert_eq!(sent[7], b"\n\n".to_vec());
    }

    #[test]
    fn test_draw_bitmap_header_then_data() {
        let (printer, log) = printer_with(test_config(), None);
        printer.start().unwrap();
        printer.draw_bitmap(&[1, 2, 3, 4], 16, 2).unwrap();

        let sent = writes(&log);
        assert_eq!(sent.len(), 5);
        assert_eq!(sent[3], vec![0x12, 0x2A, 0x02, 0x02]);
        assert_eq!(sent[4], vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_draw_bitmap_rejects_size_mismatch() {
        let (printer, log) = printer_with(test_config(), None);
        printer.start().unwrap();

        assert!(matches!(
            printer.draw_bitmap(&[0; 10], 16, 4),
            Err(Error::BitmapSizeMismatch {
                expected: 8,
                actual: 10
            })
        ));
        // width rounds up to whole bytes
        assert!(matches!(
            printer.draw_bitmap(&[0; 3], 9, 2),
            Err(Error::BitmapSizeMismatch {
                expected: 4,
                actual: 3
            })
        ));
        assert!(matches!(
            printer.draw_bitmap(&[0; 256], 8, 256),
            Err(Error::BitmapTooLarge { .. })
        ));
        assert_eq!(writes(&log).len(), 3);
    }

    #[test]
    fn test_print_bitmap_splits_blocks() {
        let (printer, log) = printer_with(test_config(), None);
        printer.start().unwrap();
        let bitmap = PackedBitmap::from_bytes(300, 16, vec![0xAA; 600]).unwrap();
        printer.print_bitmap(&bitmap).unwrap();

        let sent = writes(&log);
        assert_eq!(sent.len(), 7);
        assert_eq!(sent[3], vec![0x12, 0x2A, 255, 2]);
        assert_eq!(sent[4].len(), 510);
        assert_eq!(sent[5], vec![0x12, 0x2A, 45, 2]);
        assert_eq!(sent[6].len(), 90);
    }

    #[test]
    fn test_transfer_failure_stops_job_and_keeps_device_open() {
        // three start-up writes, header, then the first data block fails
        let (printer, log) = printer_with(test_config(), Some(5));
        printer.start().unwrap();
        let bitmap = PackedBitmap::from_bytes(300, 16, vec![0xAA; 600]).unwrap();

        assert!(matches!(
            printer.print_bitmap(&bitmap),
            Err(Error::Transfer(rusb::Error::Pipe))
        ));
        {
            let log = log.lock().unwrap();
            assert_eq!(log.attempts, 5);
            assert!(!log.closed);
        }
        assert_eq!(printer.state().unwrap(), State::Configured);

        printer.close().unwrap();
        assert!(log.lock().unwrap().closed);
    }

    #[test]
    fn test_sleep_and_wake_resume() {
        let (printer, log) = printer_with(test_config(), None);
        printer.start().unwrap();
        printer.sleep().unwrap();
        assert_eq!(printer.state().unwrap(), State::Sleeping);
        assert!(matches!(
            printer.print("zzz"),
            Err(Error::InvalidState {
                state: State::Sleeping,
                ..
            })
        ));

        printer.wake().unwrap();
        assert_eq!(printer.state().unwrap(), State::Configured);
        let sent = writes(&log);
        assert_eq!(sent[3], vec![0x1B, 0x38, 0x01, 0x00]);
        assert_eq!(sent[4], vec![0xFF]);
    }

    #[test]
    fn test_print_image_end_to_end() {
        let (printer, log) = printer_with(test_config().dot_height(2), None);
        printer.start().unwrap();
        let image = RasterImage::gray(2, 2, vec![0, 255, 255, 0]).unwrap();
        printer.print_image(image, TransformOptions::new()).unwrap();

        let sent = writes(&log);
        assert_eq!(
            sent[3..].to_vec(),
            vec![
                vec![0x12, 0x2A, 0x02, 0x01],
                vec![0x40, 0x80],
                vec![b'\n', b'\n']
            ]
        );
    }

    #[test]
    fn test_print_image_invalid_source_sends_nothing() {
        let (printer, log) = printer_with(test_config(), None);
        printer.start().unwrap();
        let image = RasterImage::gray(0, 5, vec![]).unwrap();

        assert!(matches!(
            printer.print_image(image, TransformOptions::new()),
            Err(Error::InvalidDimensions { .. })
        ));
        assert_eq!(writes(&log).len(), 3);
    }
}
