mod source_set;
