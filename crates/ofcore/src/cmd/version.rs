use ofcore_codec::CODEC_VERSIONS;
use ofcore_frame::version_label;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("ofcore {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let versions: Vec<String> = CODEC_VERSIONS.iter().map(|v| version_label(*v)).collect();
    println!("name: ofcore");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("OFCORE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("OFCORE_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("openflow: {}", versions.join(", "));
    println!(
        "features: controller={}, cli=true",
        cfg!(feature = "controller")
    );

    Ok(SUCCESS)
}
