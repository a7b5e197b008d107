use clap::{Parser, Subcommand};
use reqwest::{Client, Response, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Parser)]
#[command(name = "postwright")]
#[command(about = "Turn articles into social posts with generated images")]
struct Cli {
    /// Base URL for the Postwright service
    #[arg(long, default_value = "http://localhost:3000")]
    service_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a post from an article
    Generate {
        /// URL of the article
        url: String,
        /// Optional guidance for the writer
        #[arg(short, long)]
        instructions: Option<String>,
    },
    /// Show image progress for a post
    Status {
        id: i32,
        /// Poll until the images are finished
        #[arg(short, long)]
        wait: bool,
    },
    /// List posts, newest first
    List,
    /// Save a post's markdown document
    Download {
        id: i32,
        /// Output path; defaults to the file name suggested by the service
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace one of a post's images
    Regenerate {
        id: i32,
        /// Prompt for the new image
        prompt: String,
        /// Which image to replace
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(i64).range(1..=2))]
        image: i64,
        /// Image model: nova or titan
        #[arg(long, default_value = "nova")]
        model: String,
    },
}

#[derive(Serialize)]
struct CreatePost {
    url: String,
    instructions: Option<String>,
}

#[derive(Deserialize)]
struct CreatePostResponse {
    id: i32,
    images_processing: bool,
}

#[derive(Deserialize)]
struct ImageStatus {
    images_processing: bool,
    image_url_1: Option<String>,
    image_url_2: Option<String>,
    images_completed_at: Option<String>,
}

#[derive(Deserialize)]
struct PostSummary {
    id: i32,
    summary: String,
    images_processing: bool,
    image_count: usize,
    created_at: String,
}

#[derive(Deserialize)]
struct ListPostsResponse {
    items: Vec<PostSummary>,
    total: usize,
}

#[derive(Serialize)]
struct RegenerateImage {
    prompt_text: String,
    model_type: String,
    image_number: i64,
}

#[derive(Deserialize)]
struct RegenerateImageResponse {
    image_url: String,
    model_type: String,
    image_number: u8,
}

const POLL_INTERVAL: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let service_url = cli.service_url.trim_end_matches('/');

    match cli.command {
        Commands::Generate { url, instructions } => {
            generate(&client, service_url, url, instructions).await?;
        }
        Commands::Status { id, wait } => status(&client, service_url, id, wait).await?,
        Commands::List => list(&client, service_url).await?,
        Commands::Download { id, output } => download(&client, service_url, id, output).await?,
        Commands::Regenerate {
            id,
            prompt,
            image,
            model,
        } => regenerate(&client, service_url, id, prompt, image, model).await?,
    }

    Ok(())
}

/// Returns the response if it succeeded, otherwise the service's error message.
async fn check(response: Response) -> Result<Response, Box<dyn Error>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await?;
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(format!("{status}: {message}").into())
}

async fn generate(
    client: &Client,
    service_url: &str,
    url: String,
    instructions: Option<String>,
) -> Result<(), Box<dyn Error>> {
    Url::parse(&url).map_err(|e| format!("Invalid URL {url}: {e}"))?;

    let endpoint = format!("{service_url}/api/v1/posts");
    let payload = CreatePost { url, instructions };

    let response = check(client.post(&endpoint).json(&payload).send().await?).await?;
    let created: CreatePostResponse = response.json().await?;

    println!("Post created with ID: {}", created.id);
    if created.images_processing {
        println!("Images are being generated; run `postwright status {} --wait`", created.id);
    } else {
        println!("Images could not be scheduled for this post");
    }
    Ok(())
}

async fn fetch_status(
    client: &Client,
    service_url: &str,
    id: i32,
) -> Result<ImageStatus, Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/posts/{id}/image-status");
    Ok(check(client.get(&endpoint).send().await?).await?.json().await?)
}

async fn status(
    client: &Client,
    service_url: &str,
    id: i32,
    wait: bool,
) -> Result<(), Box<dyn Error>> {
    let mut current = fetch_status(client, service_url, id).await?;
    while wait && current.images_processing {
        eprintln!("Images still processing...");
        tokio::time::sleep(POLL_INTERVAL).await;
        current = fetch_status(client, service_url, id).await?;
    }

    if current.images_processing {
        println!("Post {id}: images processing");
        return Ok(());
    }

    println!(
        "Post {id}: images finished at {}",
        current.images_completed_at.as_deref().unwrap_or("unknown time")
    );
    for (n, url) in [current.image_url_1, current.image_url_2].iter().enumerate() {
        match url {
            Some(url) => println!("  Image {}: {url}", n + 1),
            None => println!("  Image {}: (none)", n + 1),
        }
    }
    Ok(())
}

async fn list(client: &Client, service_url: &str) -> Result<(), Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/posts");
    let posts: ListPostsResponse = check(client.get(&endpoint).send().await?).await?.json().await?;

    println!("{} post(s)", posts.total);
    for post in posts.items {
        let images = if post.images_processing {
            "processing".to_string()
        } else {
            format!("{} image(s)", post.image_count)
        };
        println!("{:>5}  {}  [{}]  {}", post.id, post.created_at, images, post.summary);
    }
    Ok(())
}

fn suggested_filename(response: &Response) -> Option<String> {
    let disposition = response.headers().get(header::CONTENT_DISPOSITION)?.to_str().ok()?;
    let name = disposition.split("filename=").nth(1)?.trim_matches('"');
    (!name.is_empty()).then(|| name.to_string())
}

async fn download(
    client: &Client,
    service_url: &str,
    id: i32,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/posts/{id}/markdown");
    let response = check(client.get(&endpoint).send().await?).await?;

    let path = output.unwrap_or_else(|| {
        PathBuf::from(suggested_filename(&response).unwrap_or_else(|| format!("post_{id}.md")))
    });
    let markdown = response.text().await?;
    tokio::fs::write(&path, markdown).await?;

    println!("Saved {}", path.display());
    Ok(())
}

async fn regenerate(
    client: &Client,
    service_url: &str,
    id: i32,
    prompt: String,
    image: i64,
    model: String,
) -> Result<(), Box<dyn Error>> {
    let endpoint = format!("{service_url}/api/v1/posts/{id}/regenerate-image");
    let payload = RegenerateImage {
        prompt_text: prompt,
        model_type: model,
        image_number: image,
    };

    let response = check(client.post(&endpoint).json(&payload).send().await?).await?;
    let regenerated: RegenerateImageResponse = response.json().await?;

    println!(
        "Image {} regenerated with {}: {}",
        regenerated.image_number, regenerated.model_type, regenerated.image_url
    );
    Ok(())
}
