/// file: src/ui.rs
/// description: ui presentation layer that handles events from the stream client
use crate::{
    events::{ClientEvent, EventReceiver},
    formatter::{Colors, OutputFormat, ReadingFormatter},
    types::ReadingBuffer,
};
use std::sync::Arc;
use tracing::{debug, info};

pub struct UIController {
    event_receiver: EventReceiver,
    formatter: ReadingFormatter,
    buffer: ReadingBuffer,
    quiet_mode: bool,
    header_printed: bool,
    max_readings: Option<u64>,
}

pub struct UIOptions {
    pub colored: bool,
    pub quiet: bool,
    pub max_readings: u64,
}

impl UIController {
    pub fn new(event_receiver: EventReceiver, format: OutputFormat, options: UIOptions) -> Self {
        Self {
            event_receiver,
            formatter: ReadingFormatter::new(format, options.colored, options.quiet),
            buffer: ReadingBuffer::default(),
            quiet_mode: options.quiet,
            header_printed: false,
            max_readings: if options.max_readings == 0 {
                None
            } else {
                Some(options.max_readings)
            },
        }
    }

    pub async fn run(&mut self) {
        self.print_startup_banner();
        while let Some(event) = self.event_receiver.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
    }

    fn handle_event(&mut self, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Starting => {
                info!("Stream client starting...");
            }
            ClientEvent::Connecting { url } => {
                self.print_connection_status("CONNECTING", &url);
            }
            ClientEvent::Connected { connection_id } => {
                self.print_connection_status("CONNECTED", &format!("ID: {}", connection_id));
            }
            ClientEvent::SubscriptionSent { machine_id } => {
                self.print_subscription_info(&machine_id);
            }
            ClientEvent::Subscribed { machine_id } => {
                self.print_subscription_confirmed(&machine_id);
                // Print the table header here, once the stream is fully live
                if !self.header_printed {
                    self.formatter.print_header();
                    self.header_printed = true;
                }
            }
            ClientEvent::ReadingReceived(reading) => {
                // Header fallback in case the server never acknowledged
                if !self.header_printed {
                    self.formatter.print_header();
                    self.header_printed = true;
                }
                self.buffer.push(Arc::clone(&reading));
                self.formatter.print_reading(&reading);

                if let Some(max_readings) = self.max_readings
                    && self.formatter.reading_count() >= max_readings
                {
                    self.print_connection_status(
                        "STOPPING",
                        &format!("Reached configured max readings ({max_readings})"),
                    );
                    return false;
                }
            }
            ClientEvent::ConnectionFailed(error) => {
                self.print_error("CONNECTION FAILED", &error);
            }
            ClientEvent::Reconnecting {
                attempt,
                delay_secs,
            } => {
                self.print_reconnect_info(delay_secs, attempt);
            }
            ClientEvent::Disconnected => {
                self.print_connection_status("DISCONNECTED", "Connection closed");
            }
            ClientEvent::Stopping => {
                self.print_connection_status("STOPPING", "Client shutting down");
            }
        }

        true
    }

    pub fn buffer(&self) -> &ReadingBuffer {
        &self.buffer
    }

    fn print_startup_banner(&self) {
        if self.quiet_mode {
            return;
        }

        println!();
        println!(
            "{}{}machine-console v{} - live sensor stream{}",
            Colors::BOLD,
            Colors::BRIGHT_CYAN,
            env!("CARGO_PKG_VERSION"),
            Colors::RESET
        );
        println!();
    }

    fn print_connection_status(&self, status: &str, message: &str) {
        if self.quiet_mode && status != "ERROR" {
            debug!("{}: {}", status, message);
            return;
        }

        let (color, symbol) = match status {
            "CONNECTING" => (Colors::BRIGHT_YELLOW, "*"),
            "CONNECTED" => (Colors::BRIGHT_GREEN, "+"),
            "DISCONNECTED" => (Colors::BRIGHT_RED, "X"),
            "STOPPING" => (Colors::BRIGHT_MAGENTA, "!"),
            _ => (Colors::WHITE, "-"),
        };

        println!(
            "{}{}[{}]{} {} {}{}{}",
            Colors::BOLD,
            color,
            status,
            Colors::RESET,
            symbol,
            Colors::WHITE,
            message,
            Colors::RESET
        );
    }

    fn print_subscription_info(&self, machine_id: &str) {
        if self.quiet_mode {
            return;
        }

        println!(
            "{}{}[SUBSCRIBING]{} > sensor stream for {}{}{}",
            Colors::BOLD,
            Colors::BRIGHT_MAGENTA,
            Colors::RESET,
            Colors::DIM,
            machine_id,
            Colors::RESET
        );
    }

    fn print_subscription_confirmed(&self, machine_id: &str) {
        if self.quiet_mode {
            return;
        }

        println!(
            "{}{}[SUBSCRIPTION OK]{} + real-time sensor updates enabled for {}{}{}",
            Colors::BOLD,
            Colors::BRIGHT_GREEN,
            Colors::RESET,
            Colors::BRIGHT_YELLOW,
            machine_id,
            Colors::RESET
        );
        println!();
    }

    fn print_error(&self, error_type: &str, message: &str) {
        println!(
            "{}{}[{}]{} ! {}{}{}",
            Colors::BOLD,
            Colors::BRIGHT_RED,
            error_type,
            Colors::RESET,
            Colors::RED,
            message,
            Colors::RESET
        );
    }

    fn print_reconnect_info(&self, delay_secs: u64, attempt: u32) {
        println!(
            "{}{}[RECONNECTING]{} > Attempt {} in {}s...",
            Colors::BOLD,
            Colors::BRIGHT_YELLOW,
            Colors::RESET,
            attempt,
            delay_secs
        );
    }
}
