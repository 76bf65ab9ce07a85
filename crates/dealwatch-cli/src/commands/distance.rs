use clap::Args;
use dealwatch_core::{distance_km, format_distance};

#[derive(Args)]
pub struct DistanceArgs {
    #[arg(allow_negative_numbers = true)]
    lat1: f64,
    #[arg(allow_negative_numbers = true)]
    lon1: f64,
    #[arg(allow_negative_numbers = true)]
    lat2: f64,
    #[arg(allow_negative_numbers = true)]
    lon2: f64,
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: DistanceArgs) -> Result<(), Box<dyn std::error::Error>> {
    let coords = [args.lat1, args.lon1, args.lat2, args.lon2];
    if coords.iter().any(|c| !c.is_finite()) {
        return Err("coordinates must be finite numbers".into());
    }

    let km = distance_km(args.lat1, args.lon1, args.lat2, args.lon2);
    if args.json {
        let value = serde_json::json!({
            "km": km,
            "display": format_distance(km),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{km:.3} km ({})", format_distance(km));
    }
    Ok(())
}
