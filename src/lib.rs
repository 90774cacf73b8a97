//! # askpdf
//!
//! Local retrieval-augmented question answering over a directory of PDFs.
//!
//! askpdf extracts text and layout structure from PDFs, splits the fused
//! text into overlapping chunks, embeds and indexes them, and answers
//! natural-language questions by retrieving relevant chunks and asking a
//! language model to compose a grounded answer. The embedding and
//! language models are served by a local Ollama instance; layout
//! detection is a local object-detection service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌─────────┐   ┌─────────┐
//! │  PDFs     │──▶│ Extract+Fuse  │──▶│  Chunk   │──▶│  Index   │
//! │ (pdf_dir) │   │ (layout cache)│   │ (nodes) │   │ (SQLite) │
//! └──────────┘   └───────────────┘   └─────────┘   └────┬────┘
//!                                                       │
//!                                                  ┌────▼────┐
//!                                                  │  Query   │
//!                                                  │ (Ollama) │
//!                                                  └─────────┘
//! ```
//!
//! ## Quick start
//!
//! ```bash
//! askpdf status                 # check Ollama and required models
//! askpdf layout                 # run layout analysis over the PDF dir
//! askpdf build                  # extract, chunk, embed, persist index
//! askpdf query "what is X?"     # one-shot question
//! askpdf chat                   # interactive loop
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`text`] | Text cleaning and metadata heuristics |
//! | [`pdf`] | PDF scanning, extraction, document assembly |
//! | [`render`] | Page rasterization (pdfium) |
//! | [`detect`] | Layout-detection service client |
//! | [`layout`] | Layout elements, cache, analyzer |
//! | [`fusion`] | Layout-to-text fusion |
//! | [`chunker`] | Sentence-aware overlapping chunker |
//! | [`embedding`] | Embedding seam and vector utilities |
//! | [`ollama`] | Ollama client (embeddings + generation) |
//! | [`index`] | Vector index build/persist/load |
//! | [`query`] | Retrieval + answer synthesis |
//! | [`service`] | Pipeline orchestration |

pub mod chunker;
pub mod config;
pub mod detect;
pub mod embedding;
pub mod fusion;
pub mod index;
pub mod layout;
pub mod models;
pub mod ollama;
pub mod pdf;
pub mod query;
pub mod render;
pub mod service;
pub mod text;
