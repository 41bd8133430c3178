mod hierarchy;
mod tracer;
