use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use masterframe_core::io::fits::read_fits;
use masterframe_core::policy::grade_raw_flat;
use masterframe_core::stack::median::nan_median;

#[derive(Args)]
pub struct InfoArgs {
    /// Input FITS file (.fits, .fit or .fits.gz)
    pub file: PathBuf,

    /// Print every header card
    #[arg(long)]
    pub header: bool,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let hdus = read_fits(&args.file)?;

    println!("File:        {}", args.file.display());
    println!("HDUs:        {}", hdus.len());

    for (index, hdu) in hdus.iter().enumerate() {
        let name = hdu.header.get_str("EXTNAME").unwrap_or("PRIMARY");
        println!();
        println!("[{index}] {name}");
        if let Some(data) = &hdu.data {
            let (h, w) = data.dim();
            println!("Dimensions:  {w}x{h}");
            match nan_median(data.iter().copied()) {
                Some(median) => {
                    println!("Median:      {median:.1}");
                    if index == 0 && hdu.header.get_bool("MASTER") != Some(true) {
                        println!("Flat grade:  {}", grade_raw_flat(median));
                    }
                }
                None => println!("Median:      all NaN"),
            }
        }
        for key in [
            "CHIP", "DATE-OBS", "EXPTIME", "JDSTART", "NIMAGES", "COLOUR", "FIELD", "DARKTDIF",
        ] {
            if let Some(value) = hdu.header.get(key) {
                println!("{:<13}{}", format!("{key}:"), value);
            }
        }
        if args.header {
            for (key, value) in hdu.header.iter() {
                println!("  {key:<8} = {value}");
            }
        }
    }

    Ok(())
}
