mod modules;
mod queries;

mod dot;
mod trace_text;
