use std::error::Error;

use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn Error>> {
    // build date and profile for the debug console banner
    EmitBuilder::builder().all_build().all_cargo().emit()?;

    // stamp dll with project metadata
    #[cfg(windows)]
    winres::WindowsResource::new().compile()?;

    Ok(())
}
