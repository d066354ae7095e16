//! Protocol test suite: binary codec, line parser and reply lines
