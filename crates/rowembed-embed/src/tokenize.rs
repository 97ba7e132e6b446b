use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Token id used for padding by BERT-family vocabularies.
pub const PAD_ID: u32 = 0;

/// Tokenize a batch and pad it to its longest member (capped at `max_len`).
///
/// Returns `(input_ids, token_type_ids, attention_mask)`, each `[B, T]` u32.
/// Only tokens the encoding marks as attended are kept, so a tokenizer with
/// fixed-length padding of its own still yields pad positions with mask 0.
/// Over-long inputs keep their final special token so the sequence stays
/// well-formed after truncation.
pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<(Tensor, Tensor, Tensor)> {
    let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let encodings = tokenizer.encode_batch(inputs, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;

    let mut rows: Vec<Vec<u32>> = Vec::with_capacity(encodings.len());
    for enc in &encodings {
        // Drop padding the tokenizer may add itself; it is re-added below with mask 0.
        let mut ids: Vec<u32> = enc.get_ids().iter().zip(enc.get_attention_mask()).filter(|&(_, &m)| m != 0).map(|(&id, _)| id).collect();
        if ids.len() > max_len {
            let last = ids[ids.len() - 1];
            ids.truncate(max_len);
            if let Some(tail) = ids.last_mut() { *tail = last; }
        }
        rows.push(ids);
    }
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let batch = rows.len();

    let mut ids = vec![PAD_ID; batch * width];
    let mut mask = vec![0u32; batch * width];
    for (i, row) in rows.iter().enumerate() {
        ids[i * width..i * width + row.len()].copy_from_slice(row);
        mask[i * width..i * width + row.len()].fill(1);
    }
    let input_ids = Tensor::from_vec(ids, (batch, width), device)?;
    let token_type_ids = Tensor::zeros((batch, width), candle_core::DType::U32, device)?;
    let attention_mask = Tensor::from_vec(mask, (batch, width), device)?;
    Ok((input_ids, token_type_ids, attention_mask))
}
