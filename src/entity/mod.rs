pub mod cip_fnct;
