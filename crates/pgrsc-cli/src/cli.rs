use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pgrsc")]
#[command(version, about = "Paged resource inspector")]
pub struct Cli {
    /// Heap layout file (TOML)
    #[arg(short, long, global = true, env = "PGRSC_HEAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the header and chunk table of a resource file
    Inspect {
        file: PathBuf,

        /// Print the header as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load a texture dictionary and show where its chunks went
    Load { file: PathBuf },

    /// Load a texture dictionary into a fragmented heap and defragment it
    Defrag {
        file: PathBuf,

        /// Copies loaded ahead of the dictionary and then destroyed
        #[arg(long, default_value_t = 2)]
        spacers: usize,
    },

    /// Load a resource and export it again
    Repack {
        input: PathBuf,
        output: PathBuf,

        #[arg(long)]
        compress: bool,
    },

    /// Dump the bytes of one chunk
    Hexdump {
        file: PathBuf,

        /// Chunk index (virtual chunks first)
        #[arg(long)]
        chunk: usize,

        /// Start offset inside the chunk (hex)
        #[arg(long, default_value = "0")]
        offset: String,

        /// Number of bytes to dump
        #[arg(long, default_value_t = 256)]
        size: usize,

        /// Show ASCII representation
        #[arg(long)]
        ascii: bool,
    },

    /// Compile a sample texture dictionary
    Sample {
        output: PathBuf,

        /// Number of textures
        #[arg(long, default_value_t = 4)]
        count: usize,

        /// Width and height of each texture
        #[arg(long, default_value_t = 256)]
        size: u16,

        #[arg(long)]
        compress: bool,
    },
}
