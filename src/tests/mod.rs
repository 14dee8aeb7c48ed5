
mod calibration_test;
