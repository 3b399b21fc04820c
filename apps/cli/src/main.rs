//! Headless client for the face-masking service: submit one image, write or
//! print the masked result.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use masking_client::{
    decode_data_url, ImageCandidate, MaskedOutput, MaskingApi, MaskingClient, UploadController,
};
use shared::domain::EditType;

#[derive(Parser, Debug)]
#[command(name = "facemask-cli", about = "Mask faces in an image via the remote service")]
struct Args {
    /// API base URL.
    #[arg(long, env = "FACEMASK_API_BASE", default_value = "http://127.0.0.1:8080/api")]
    api_base: String,
    /// Mask style applied to detected faces.
    #[arg(long, value_enum, default_value_t = EditTypeArg::Bouquet)]
    edit_type: EditTypeArg,
    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
    /// Where to write the masked image. Defaults to `masked_<input name>`
    /// next to the input; for signed-URL responses without this flag the URL
    /// is printed instead.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Image to submit (PNG or JPEG).
    image: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EditTypeArg {
    Bouquet,
    Postcard,
}

impl From<EditTypeArg> for EditType {
    fn from(arg: EditTypeArg) -> Self {
        match arg {
            EditTypeArg::Bouquet => EditType::Bouquet,
            EditTypeArg::Postcard => EditType::Postcard,
        }
    }
}

fn default_output_path(input: &PathBuf) -> PathBuf {
    let name = input
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image");
    input.with_file_name(format!("masked_{name}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let client = MaskingClient::with_timeout(&args.api_base, Duration::from_secs(args.timeout_secs))
        .with_context(|| format!("invalid API base '{}'", args.api_base))?;
    let api = Arc::new(client);
    let mut controller = UploadController::new(api.clone() as Arc<dyn MaskingApi>);

    tracing::info!(
        api_base = %args.api_base,
        image = %args.image.display(),
        "masking via remote service"
    );
    let candidate = ImageCandidate::from_path(&args.image)
        .await
        .with_context(|| format!("reading {}", args.image.display()))?;
    let selected = controller.select_image(candidate)?;
    println!(
        "submitting {} ({} bytes, {})",
        selected.filename,
        selected.bytes.len(),
        selected.format.mime_type()
    );

    let outcome = controller
        .submit_mask_request(args.edit_type.into())
        .await?
        .context("nothing was submitted")?;

    if let Some(faces) = outcome.faces_detected {
        println!("faces detected: {faces}");
    }
    if outcome.fallback_used {
        tracing::warn!("service used its fallback detector");
        println!("note: the service used its fallback detector");
    }
    if let Some(message) = &outcome.message {
        println!("service: {message}");
    }

    match outcome.output {
        Some(MaskedOutput::DataUrl(data_url)) => {
            let (_, bytes) = decode_data_url(&data_url)?;
            let path = args
                .output
                .unwrap_or_else(|| default_output_path(&args.image));
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        Some(MaskedOutput::SignedUrl(url)) => match args.output {
            Some(path) => {
                let bytes = api.fetch_image(&url).await?;
                tokio::fs::write(&path, &bytes)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("wrote {}", path.display());
            }
            None => println!("masked image available at {url}"),
        },
        None => bail!("service reported success but returned no masked image"),
    }

    Ok(())
}
