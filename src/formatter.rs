use crate::types::{Machine, PredictionResponse, PredictionStatus, SensorReading};

// ANSI color codes
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";

    // Colors
    pub const RED: &'static str = "\x1b[31m";
    pub const GREEN: &'static str = "\x1b[32m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const CYAN: &'static str = "\x1b[36m";
    pub const WHITE: &'static str = "\x1b[37m";
    pub const GRAY: &'static str = "\x1b[90m";

    // Bright colors
    pub const BRIGHT_RED: &'static str = "\x1b[91m";
    pub const BRIGHT_GREEN: &'static str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &'static str = "\x1b[93m";
    pub const BRIGHT_BLUE: &'static str = "\x1b[94m";
    pub const BRIGHT_MAGENTA: &'static str = "\x1b[95m";
    pub const BRIGHT_CYAN: &'static str = "\x1b[96m";
}

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
    Minimal,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "csv" => OutputFormat::Csv,
            "json" => OutputFormat::Json,
            "minimal" => OutputFormat::Minimal,
            _ => OutputFormat::Table,
        }
    }
}

pub struct ReadingFormatter {
    format: OutputFormat,
    colored: bool,
    quiet: bool,
    reading_count: u64,
}

impl ReadingFormatter {
    pub fn new(format: OutputFormat, colored: bool, quiet: bool) -> Self {
        Self {
            format,
            colored,
            quiet,
            reading_count: 0,
        }
    }

    pub fn reading_count(&self) -> u64 {
        self.reading_count
    }

    pub fn print_header(&self) {
        if self.quiet {
            return;
        }

        match self.format {
            OutputFormat::Table => self.print_table_header(),
            OutputFormat::Csv => println!(
                "udi,timestamp,machine_id,product_id,air_temp,process_temp,rotational_speed,torque,tool_wear"
            ),
            OutputFormat::Json => {}
            OutputFormat::Minimal => {}
        }
    }

    pub fn print_reading(&mut self, reading: &SensorReading) {
        self.reading_count += 1;

        match self.format {
            OutputFormat::Table => self.print_table_row(reading),
            OutputFormat::Csv => self.print_csv_row(reading),
            OutputFormat::Json => self.print_json_row(reading),
            OutputFormat::Minimal => self.print_minimal_row(reading),
        }
    }

    fn print_table_header(&self) {
        let rule = "─".repeat(86);
        if self.colored {
            println!("{}{}{}{}", Colors::BOLD, Colors::GRAY, rule, Colors::RESET);
            println!(
                "{}{:<6} {:<10} {:<10} {:>9} {:>9} {:>8} {:>8} {:>6} {:<12}{}",
                Colors::BOLD,
                "COUNT",
                "TIME",
                "MACHINE",
                "AIR K",
                "PROC K",
                "RPM",
                "TORQUE",
                "WEAR",
                "PRODUCT",
                Colors::RESET
            );
            println!("{}{}{}{}", Colors::BOLD, Colors::GRAY, rule, Colors::RESET);
        } else {
            println!("{rule}");
            println!(
                "{:<6} {:<10} {:<10} {:>9} {:>9} {:>8} {:>8} {:>6} {:<12}",
                "COUNT", "TIME", "MACHINE", "AIR K", "PROC K", "RPM", "TORQUE", "WEAR", "PRODUCT"
            );
            println!("{rule}");
        }
    }

    fn time_label(reading: &SensorReading) -> String {
        reading
            .datetime_local()
            .map(|dt| dt.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string())
    }

    fn print_table_row(&self, reading: &SensorReading) {
        let time = Self::time_label(reading);
        if self.colored {
            println!(
                "{}{:<6}{} {}{:<10}{} {}{:<10}{} {:>9.1} {:>9.1} {:>8.0} {:>8.1} {:>6.0} {}{:<12}{}",
                Colors::GRAY,
                self.reading_count,
                Colors::RESET,
                Colors::DIM,
                time,
                Colors::RESET,
                Colors::BRIGHT_CYAN,
                reading.machine_id,
                Colors::RESET,
                reading.air_temp,
                reading.process_temp,
                reading.rotational_speed,
                reading.torque,
                reading.tool_wear,
                Colors::DIM,
                reading.product_id,
                Colors::RESET
            );
        } else {
            println!(
                "{:<6} {:<10} {:<10} {:>9.1} {:>9.1} {:>8.0} {:>8.1} {:>6.0} {:<12}",
                self.reading_count,
                time,
                reading.machine_id,
                reading.air_temp,
                reading.process_temp,
                reading.rotational_speed,
                reading.torque,
                reading.tool_wear,
                reading.product_id
            );
        }
    }

    fn print_csv_row(&self, reading: &SensorReading) {
        println!(
            "{},{},{},{},{},{},{},{},{}",
            reading.udi,
            reading.timestamp.as_deref().unwrap_or(""),
            reading.machine_id,
            reading.product_id,
            reading.air_temp,
            reading.process_temp,
            reading.rotational_speed,
            reading.torque,
            reading.tool_wear
        );
    }

    fn print_json_row(&self, reading: &SensorReading) {
        if let Ok(json) = serde_json::to_string(reading) {
            println!("{json}");
        }
    }

    fn print_minimal_row(&self, reading: &SensorReading) {
        println!(
            "{} air={:.1} proc={:.1} rpm={:.0} torque={:.1} wear={:.0}",
            reading.machine_id,
            reading.air_temp,
            reading.process_temp,
            reading.rotational_speed,
            reading.torque,
            reading.tool_wear
        );
    }
}

/// One-off render of the machine catalog.
pub fn print_machines(machines: &[Machine], colored: bool) {
    if machines.is_empty() {
        println!("No machines registered");
        return;
    }

    println!(
        "{:<12} {:<6} {:<20} {:<16} {:<12}",
        "ID", "TYPE", "NAME", "LOCATION", "STATUS"
    );
    for machine in machines {
        if colored {
            println!(
                "{}{:<12}{} {:<6} {:<20} {:<16} {}{:<12}{}",
                Colors::BRIGHT_CYAN,
                machine.id,
                Colors::RESET,
                machine.machine_type,
                machine.name,
                machine.location,
                status_color(&machine.status),
                machine.status,
                Colors::RESET
            );
        } else {
            println!(
                "{:<12} {:<6} {:<20} {:<16} {:<12}",
                machine.id, machine.machine_type, machine.name, machine.location, machine.status
            );
        }
    }
}

pub fn print_machine(machine: &Machine) {
    println!("id:               {}", machine.id);
    println!("product id:       {}", machine.product_id);
    println!("type:             {}", machine.machine_type);
    println!("name:             {}", machine.name);
    println!("description:      {}", machine.description);
    println!("location:         {}", machine.location);
    println!(
        "installed:        {}",
        machine.installation_date.as_deref().unwrap_or("-")
    );
    println!(
        "last maintenance: {}",
        machine.last_maintenance_date.as_deref().unwrap_or("-")
    );
    println!("status:           {}", machine.status);
}

fn status_color(status: &str) -> &'static str {
    match status.to_lowercase().as_str() {
        "operational" | "active" | "running" => Colors::BRIGHT_GREEN,
        "maintenance" | "degraded" => Colors::BRIGHT_YELLOW,
        "failed" | "offline" => Colors::BRIGHT_RED,
        _ => Colors::WHITE,
    }
}

pub fn print_prediction(prediction: &PredictionResponse, colored: bool) {
    let color = match prediction.status {
        PredictionStatus::Normal => Colors::BRIGHT_GREEN,
        PredictionStatus::Anomaly => Colors::BRIGHT_YELLOW,
        PredictionStatus::Failure => Colors::BRIGHT_RED,
    };

    if colored {
        println!(
            "{}{}[{}]{}",
            Colors::BOLD,
            color,
            prediction.status.to_string().to_uppercase(),
            Colors::RESET
        );
    } else {
        println!("[{}]", prediction.status.to_string().to_uppercase());
    }

    if let Some(message) = &prediction.message {
        println!("{message}");
    }
    if let Some(failure_type) = &prediction.failure_type {
        println!("failure type: {failure_type}");
    }
    if let Some(failure_code) = &prediction.failure_code {
        println!("failure code: {failure_code}");
    }
}
