use axml_patch::{axml_to_xml, ManifestPatcher, PlatformConfig};
use std::env;
use std::error::Error;
use std::fs;

// Patches a binary AndroidManifest.xml pulled out of an APK and prints the result as text XML.

//Usage: patch_manifest <AndroidManifest.xml> <output> <package> <app name> [debuggable] [sdk_int]
fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        eprintln!(
            "Usage: {} <AndroidManifest.xml> <output> <package> <app name> [debuggable] [sdk_int]",
            args[0]
        );
        std::process::exit(1);
    }

    match process_manifest(&args) {
        Ok(_) => println!("Wrote patched manifest to {}", args[2]),
        Err(err) => {
            eprintln!("Failed: {err}");
            std::process::exit(1);
        }
    }
}

fn process_manifest(args: &[String]) -> Result<(), Box<dyn Error>> {
    let debuggable = args.get(5).map(|flag| flag == "true").unwrap_or(false);
    let config = match args.get(6) {
        Some(sdk) => PlatformConfig::with_sdk_int(sdk.parse()?),
        None => PlatformConfig::default(),
    };

    let manifest = fs::read(&args[1])?;
    let patcher = ManifestPatcher::new(config);
    let patched = patcher.patch_manifest(&manifest, &args[3], &args[4], debuggable)?;
    fs::write(&args[2], &patched)?;

    println!("{}", axml_to_xml(&patched)?);
    Ok(())
}
