mod doc_bee;

#[cfg(test)]
pub use doc_bee::DocBee;
