use log::{error, info};
use std::{env, process};

use thermal_raster::{
    Config, Error, Printer, RasterImage, TransformOptions, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID,
};

//
// cargo run -- photo.png blur
// cargo run -- --text "Hello, world!"
//
// The device is selected with PRINTER_VENDOR_ID, PRINTER_PRODUCT_ID and
// PRINTER_SERIAL, read from the environment or a .env file.
//

#[derive(Debug, PartialEq)]
enum Job {
    Image {
        path: String,
        options: TransformOptions,
    },
    Text(String),
}

fn print_usage() {
    println!("usage: thermal-raster <image-path> [blur] [edges]");
    println!("       thermal-raster --text <message>");
}

fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{}:{}] {} - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let job = match parse_args(&args) {
        Some(job) => job,
        None => {
            print_usage();
            return;
        }
    };

    let config = match config_from_env() {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(2);
        }
    };

    if let Err(err) = run(config, job) {
        error!("{:?}", err);
        eprintln!("Print failed: {}", err);
        process::exit(1);
    }
}

fn run(config: Config, job: Job) -> Result<(), Error> {
    let printer = Printer::new(config)?;
    let result = print_job(&printer, job);
    printer.close()?;
    result
}

fn print_job(printer: &Printer, job: Job) -> Result<(), Error> {
    printer.start()?;
    match job {
        Job::Image { path, options } => {
            let image = RasterImage::open(&path)?;
            info!(
                "Printing {} ({}x{}) {:?}",
                path,
                image.width(),
                image.height(),
                options
            );
            printer.print_image(image, options)?;
        }
        Job::Text(text) => {
            printer.print(&text)?;
            printer.feed(2)?;
        }
    }
    printer.sleep()
}

fn parse_args(args: &[String]) -> Option<Job> {
    let (first, rest) = args.split_first()?;
    match first.as_str() {
        "-h" | "--help" => None,
        "--text" => {
            if rest.is_empty() {
                None
            } else {
                Some(Job::Text(rest.join(" ")))
            }
        }
        path => {
            let mut options = TransformOptions::new();
            for flag in rest {
                match flag.as_str() {
                    "blur" => options = options.blur(true),
                    "edges" => options = options.edges(true),
                    _ => return None,
                }
            }
            Some(Job::Image {
                path: path.to_string(),
                options,
            })
        }
    }
}

fn config_from_env() -> Result<Config, String> {
    let vendor_id = env_id("PRINTER_VENDOR_ID", DEFAULT_VENDOR_ID)?;
    let product_id = env_id("PRINTER_PRODUCT_ID", DEFAULT_PRODUCT_ID)?;

    let mut config = Config::new(vendor_id, product_id).heat(10, 140, 4);
    if let Ok(serial) = env::var("PRINTER_SERIAL") {
        config = config.serial(serial);
    }
    Ok(config)
}

fn env_id(key: &str, default: u16) -> Result<u16, String> {
    match env::var(key) {
        Ok(value) => parse_id(&value)
            .ok_or_else(|| format!("{} is not a valid hex id: {}", key, value)),
        Err(_) => Ok(default),
    }
}

fn parse_id(value: &str) -> Option<u16> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u16::from_str_radix(digits, 16).ok()
}
